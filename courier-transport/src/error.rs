//! Error types for routing and request/response correlation.
//!
//! Two families:
//! - [`RouterError`]: returned by router operations (registering a request,
//!   routing an inbound envelope, building the router).
//! - [`ReplyError`]: delivered to whoever waits on a pending request.

use courier_core::{CodecError, CorrelationToken, EnvelopeError};
use serde::{Deserialize, Serialize};

/// Errors returned by [`Router`](crate::Router) operations.
///
/// Every variant is scoped to one exchange; none of them leaves the pending
/// table in a partially updated state.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Inbound bytes could not be turned into envelopes.
    #[error(transparent)]
    MalformedEnvelope(#[from] EnvelopeError),

    /// Well-formed envelope with no pending request and no handler for its type.
    #[error(
        "unroutable message: no handler for type {message_type:?} \
         (token {correlation_token}, from {sender_identity:?})"
    )]
    UnroutableMessage {
        /// Type tag of the rejected envelope.
        message_type: String,
        /// Token of the rejected envelope, for a negative reply.
        correlation_token: CorrelationToken,
        /// Connection the envelope arrived on.
        sender_identity: String,
    },

    /// The handler could not parse the payload for its message type.
    #[error("handler for {message_type:?} rejected payload: {source}")]
    PayloadRejected {
        /// Type tag of the envelope.
        message_type: String,
        /// Underlying codec failure.
        #[source]
        source: CodecError,
    },

    /// The handler ran and reported a failure.
    #[error("handler for {message_type:?} failed: {message}")]
    HandlerFailed {
        /// Type tag of the envelope.
        message_type: String,
        /// Handler-provided description.
        message: String,
    },

    /// Two handlers were registered for the same message type.
    #[error("duplicate handler for message type {message_type:?}")]
    DuplicateHandler {
        /// The contested type tag.
        message_type: String,
    },

    /// A handler was registered for the empty message type.
    #[error("handlers cannot be registered for an empty message type")]
    EmptyMessageType,

    /// A caller-chosen token is already awaiting a reply.
    #[error("correlation token {token} is already pending")]
    TokenInUse {
        /// The contested token.
        token: CorrelationToken,
    },

    /// The token generator kept producing tokens that were already pending.
    #[error("no unused correlation token after {attempts} attempts")]
    TokenCollision {
        /// Number of tokens drawn.
        attempts: u32,
    },

    /// The pending table is at capacity.
    #[error("too many pending requests (limit {limit})")]
    TooManyPending {
        /// Configured maximum.
        limit: usize,
    },

    /// The router has been shut down.
    #[error("router closed")]
    Closed,
}

impl RouterError {
    /// Whether this error is an unparseable or oversized envelope.
    pub fn is_malformed(&self) -> bool {
        matches!(self, RouterError::MalformedEnvelope(_))
    }

    /// Whether this error is an envelope nobody could take.
    pub fn is_unroutable(&self) -> bool {
        matches!(self, RouterError::UnroutableMessage { .. })
    }
}

/// Outcome delivered to a caller waiting on a pending request.
///
/// Serializable so a transport can forward it as a negative reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyError {
    /// No reply arrived before the deadline. The entry has been removed; a
    /// reply arriving later is treated as unsolicited.
    Timeout,

    /// The entry was deregistered without a reply.
    Abandoned,

    /// The router shut down while the request was pending.
    RouterClosed,
}

impl std::fmt::Display for ReplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyError::Timeout => write!(f, "request timed out"),
            ReplyError::Abandoned => write!(f, "request abandoned"),
            ReplyError::RouterClosed => write!(f, "router closed"),
        }
    }
}

impl std::error::Error for ReplyError {}
