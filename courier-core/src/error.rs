//! Error types for envelope decoding.

/// Errors produced while turning wire bytes back into envelopes.
///
/// Both variants are scoped to the single message (or batch) being decoded.
/// They never imply anything about the connection the bytes arrived on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnvelopeError {
    /// The bytes do not parse as the envelope wire structure.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] prost::DecodeError),

    /// The input exceeds the configured size bound and was not parsed.
    #[error("envelope too large: {size} bytes (max {max})")]
    TooLarge {
        /// Size of the rejected input in bytes.
        size: usize,
        /// Maximum accepted size in bytes.
        max: usize,
    },
}

impl EnvelopeError {
    /// Whether this error came from the parser rather than a size check.
    pub fn is_malformed(&self) -> bool {
        matches!(self, EnvelopeError::Malformed(_))
    }
}
