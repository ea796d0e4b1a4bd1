//! The envelope: the atomic unit exchanged between peers.
//!
//! An [`Envelope`] carries a type tag, a correlation token, opaque payload
//! bytes and the identity of the connection it came from. It is a passive
//! carrier: construction never validates, and an empty or unknown type tag
//! is a problem for whoever dispatches the envelope, not for the envelope.

use bytes::Bytes;
use prost::Message as _;

use crate::error::EnvelopeError;
use crate::token::CorrelationToken;
use crate::wire::EnvelopeProto;

/// Immutable message envelope.
///
/// Fields are private and only readable through accessors; an envelope is
/// never modified after construction. Cloning is cheap because the payload
/// is reference counted.
///
/// # Examples
///
/// ```
/// use courier_core::Envelope;
///
/// let ping = Envelope::new("ping", "abc123", &b"1"[..], "peer-7");
/// let bytes = ping.encode();
///
/// let decoded = Envelope::decode(&bytes).expect("decode");
/// assert_eq!(decoded, ping);
/// assert_eq!(decoded.message_type(), "ping");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Envelope {
    message_type: String,
    correlation_token: CorrelationToken,
    payload: Bytes,
    sender_identity: String,
}

impl Envelope {
    /// Build an envelope from its four fields. Always succeeds.
    pub fn new(
        message_type: impl Into<String>,
        correlation_token: impl Into<CorrelationToken>,
        payload: impl Into<Bytes>,
        sender_identity: impl Into<String>,
    ) -> Self {
        Self {
            message_type: message_type.into(),
            correlation_token: correlation_token.into(),
            payload: payload.into(),
            sender_identity: sender_identity.into(),
        }
    }

    /// Build a reply to `request`, carrying the request's correlation token.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier_core::Envelope;
    ///
    /// let ping = Envelope::new("ping", "abc123", &b"1"[..], "peer-7");
    /// let pong = Envelope::reply_to(&ping, "pong", &b"1"[..], "node-0");
    /// assert_eq!(pong.correlation_token(), ping.correlation_token());
    /// ```
    pub fn reply_to(
        request: &Envelope,
        message_type: impl Into<String>,
        payload: impl Into<Bytes>,
        sender_identity: impl Into<String>,
    ) -> Self {
        Self::new(
            message_type,
            request.correlation_token.clone(),
            payload,
            sender_identity,
        )
    }

    /// Type tag selecting the payload schema and handler.
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Token linking this envelope to a request/reply exchange.
    pub fn correlation_token(&self) -> &CorrelationToken {
        &self.correlation_token
    }

    /// Opaque payload bytes.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Identity of the connection this envelope belongs to.
    pub fn sender_identity(&self) -> &str {
        &self.sender_identity
    }

    /// Whether this envelope answers `request` (same correlation token).
    pub fn answers(&self, request: &Envelope) -> bool {
        self.correlation_token == request.correlation_token
    }

    /// Consume the envelope, returning `(message_type, token, payload, sender)`.
    pub fn into_parts(self) -> (String, CorrelationToken, Bytes, String) {
        (
            self.message_type,
            self.correlation_token,
            self.payload,
            self.sender_identity,
        )
    }

    /// Encode to the wire format.
    pub fn encode(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }

    /// Number of bytes `encode` will produce.
    pub fn encoded_len(&self) -> usize {
        self.to_proto().encoded_len()
    }

    /// Decode from the wire format.
    ///
    /// Absent fields decode to empty values and unknown fields are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] if `bytes` is not a valid encoding
    /// (truncated inside a field, invalid tag or wire type, invalid UTF-8 in
    /// a string field).
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let proto = EnvelopeProto::decode(bytes)?;
        Ok(Self::from(proto))
    }

    /// Decode bytes received from a connection, stamping the transport's
    /// identity for that connection over whatever the bytes claimed.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Malformed`] under the same conditions as
    /// [`Envelope::decode`].
    pub fn decode_from_peer(
        bytes: &[u8],
        sender_identity: impl Into<String>,
    ) -> Result<Self, EnvelopeError> {
        let mut proto = EnvelopeProto::decode(bytes)?;
        proto.sender_identity = sender_identity.into();
        Ok(Self::from(proto))
    }

    pub(crate) fn to_proto(&self) -> EnvelopeProto {
        EnvelopeProto {
            message_type: self.message_type.clone(),
            correlation_token: self.correlation_token.as_str().to_string(),
            payload: self.payload.clone(),
            sender_identity: self.sender_identity.clone(),
        }
    }
}

impl From<EnvelopeProto> for Envelope {
    fn from(proto: EnvelopeProto) -> Self {
        Self {
            message_type: proto.message_type,
            correlation_token: CorrelationToken::from(proto.correlation_token),
            payload: proto.payload,
            sender_identity: proto.sender_identity,
        }
    }
}

impl From<Envelope> for EnvelopeProto {
    fn from(envelope: Envelope) -> Self {
        EnvelopeProto {
            message_type: envelope.message_type,
            correlation_token: envelope.correlation_token.into_string(),
            payload: envelope.payload,
            sender_identity: envelope.sender_identity,
        }
    }
}
