//! Wire schema for envelopes and batches.
//!
//! Envelopes are encoded as Protocol Buffers (proto3). The schema is kept by
//! hand next to the types instead of being generated by a build script:
//!
//! ```text
//! message Envelope {
//!   string message_type      = 1;
//!   string correlation_token = 2;
//!   bytes  payload           = 3;
//!   string sender_identity   = 4;
//! }
//!
//! message EnvelopeBatch {
//!   repeated Envelope envelopes = 1;
//! }
//! ```
//!
//! Field numbers are frozen. New fields must take new numbers; readers skip
//! fields they do not know, and absent fields decode to their zero value.

use bytes::Bytes;

/// Version of the schema above. Bumped only when a field is added.
pub const WIRE_SCHEMA_VERSION: u32 = 1;

/// Wire representation of a single envelope.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnvelopeProto {
    /// Type tag selecting the payload schema and handler.
    #[prost(string, tag = "1")]
    pub message_type: ::prost::alloc::string::String,
    /// Token linking a reply to its request.
    #[prost(string, tag = "2")]
    pub correlation_token: ::prost::alloc::string::String,
    /// Opaque payload bytes.
    #[prost(bytes = "bytes", tag = "3")]
    pub payload: Bytes,
    /// Identity of the originating connection.
    #[prost(string, tag = "4")]
    pub sender_identity: ::prost::alloc::string::String,
}

/// Wire representation of an ordered envelope batch.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EnvelopeBatchProto {
    /// Envelopes in transmission order.
    #[prost(message, repeated, tag = "1")]
    pub envelopes: ::prost::alloc::vec::Vec<EnvelopeProto>,
}
