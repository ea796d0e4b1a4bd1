//! Payload codecs.
//!
//! Envelopes carry payloads as opaque bytes. A handler that wants a typed
//! view of its message type picks a [`MessageCodec`]; [`JsonCodec`] ships
//! for tests and human-readable traffic.
//!
//! ```rust
//! use courier_core::{Envelope, JsonCodec, MessageCodec};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Ping { seq: u32 }
//!
//! let payload = JsonCodec.encode_bytes(&Ping { seq: 1 }).expect("encode");
//! let envelope = Envelope::new("ping", "abc123", payload, "peer-7");
//!
//! let ping: Ping = JsonCodec.decode(envelope.payload()).expect("decode");
//! assert_eq!(ping, Ping { seq: 1 });
//! ```

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Boxed error from the underlying serialization library.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A payload could not be converted to or from its typed form.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] BoxError),

    /// The bytes are not a valid encoding of the expected type.
    #[error("failed to decode payload: {0}")]
    Decode(#[source] BoxError),
}

/// Serialization format for envelope payloads.
pub trait MessageCodec: Clone + Send + Sync + 'static {
    /// Serialize `value`.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Deserialize a `T` from `payload`.
    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError>;

    /// Serialize `value` straight into an envelope payload.
    fn encode_bytes<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError> {
        self.encode(value).map(Bytes::from)
    }
}

/// JSON payloads via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(Box::new(e)))
    }

    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(payload).map_err(|e| CodecError::Decode(Box::new(e)))
    }
}
