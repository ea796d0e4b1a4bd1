//! # courier-core
//!
//! Value types shared by every courier peer:
//!
//! - [`Envelope`]: type tag, correlation token, opaque payload, sender identity
//! - [`EnvelopeBatch`]: ordered envelopes sent as one transport unit
//! - [`CorrelationToken`] and the [`TokenGenerator`] implementations
//! - [`wire`]: the Protocol Buffers schema both types encode to
//!
//! It also carries the provider traits the correlation router is generic
//! over ([`TimeProvider`], [`RandomProvider`]) and the [`MessageCodec`]
//! handlers use to read payloads.
//!
//! ## Wire round trip
//!
//! ```
//! use courier_core::{Envelope, EnvelopeBatch};
//!
//! let batch = EnvelopeBatch::single(Envelope::new("ping", "abc123", &b"1"[..], "peer-7"));
//! let bytes = batch.encode();
//!
//! // The transport knows which connection the bytes came from.
//! let received = EnvelopeBatch::decode_from_peer(&bytes, "conn-3").expect("decode");
//! assert_eq!(received.envelopes()[0].sender_identity(), "conn-3");
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod batch;
mod codec;
mod envelope;
mod error;
mod random;
mod time;
mod token;
pub mod wire;

pub use batch::EnvelopeBatch;
pub use codec::{BoxError, CodecError, JsonCodec, MessageCodec};
pub use envelope::Envelope;
pub use error::EnvelopeError;
pub use random::{RandomProvider, SeededRandomProvider, SystemRandomProvider};
pub use time::{TimeError, TimeProvider, TokioTimeProvider};
pub use token::{
    CorrelationToken, RandomTokenGenerator, SequentialTokenGenerator, TokenGenerator,
};
