//! Typed message handlers and the frozen registry the router dispatches on.
//!
//! A handler owns one message type. It parses the payload into its own
//! request type and optionally produces a [`Reply`]; the router wraps the
//! reply in an envelope carrying the inbound token.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::{CodecError, Envelope, MessageCodec};
use serde::Serialize;

use crate::error::RouterError;

/// Reply produced by a handler: a type tag and an encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Type tag of the reply envelope.
    pub message_type: String,
    /// Encoded reply body.
    pub payload: Bytes,
}

impl Reply {
    /// Reply with an already encoded payload.
    pub fn new(message_type: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            message_type: message_type.into(),
            payload: payload.into(),
        }
    }

    /// Reply whose payload is `value` encoded with `codec`.
    pub fn encode<C: MessageCodec, V: Serialize>(
        message_type: impl Into<String>,
        codec: &C,
        value: &V,
    ) -> Result<Self, CodecError> {
        Ok(Self::new(message_type, codec.encode_bytes(value)?))
    }
}

/// Failure reported by a handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The payload (or the reply) could not go through the codec.
    #[error(transparent)]
    Payload(#[from] CodecError),

    /// Handler-specific failure.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Convenience constructor for [`HandlerError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Handler for one message type.
///
/// `parse` runs first; a parse failure is reported as
/// [`RouterError::PayloadRejected`] and `handle` is not called.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Parsed form of the payload.
    type Request: Send;

    /// Turn the raw payload into a request.
    fn parse(&self, payload: &Bytes) -> Result<Self::Request, CodecError>;

    /// Process one request. `envelope` is the inbound envelope, for its
    /// token and sender identity.
    async fn handle(
        &self,
        request: Self::Request,
        envelope: &Envelope,
    ) -> Result<Option<Reply>, HandlerError>;
}

/// Type-erased handler stored in the registry.
#[async_trait]
pub(crate) trait DynHandler: Send + Sync {
    async fn dispatch(&self, envelope: &Envelope) -> Result<Option<Reply>, RouterError>;
}

#[async_trait]
impl<H: Handler> DynHandler for H {
    async fn dispatch(&self, envelope: &Envelope) -> Result<Option<Reply>, RouterError> {
        let request = self
            .parse(envelope.payload())
            .map_err(|source| RouterError::PayloadRejected {
                message_type: envelope.message_type().to_string(),
                source,
            })?;

        match self.handle(request, envelope).await {
            Ok(reply) => Ok(reply),
            Err(HandlerError::Payload(source)) => Err(RouterError::PayloadRejected {
                message_type: envelope.message_type().to_string(),
                source,
            }),
            Err(HandlerError::Failed(message)) => Err(RouterError::HandlerFailed {
                message_type: envelope.message_type().to_string(),
                message,
            }),
        }
    }
}

/// Frozen mapping from message type to handler.
///
/// Built once through [`HandlerRegistryBuilder`]; there is no way to add or
/// remove handlers afterwards.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<HashMap<String, Arc<dyn DynHandler>>>,
}

impl HandlerRegistry {
    /// Start building a registry.
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Whether a handler exists for `message_type`.
    pub fn contains(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    /// Number of registered message types.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered message types, sorted.
    pub fn message_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub(crate) fn get(&self, message_type: &str) -> Option<&Arc<dyn DynHandler>> {
        self.handlers.get(message_type)
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("message_types", &self.message_types())
            .finish()
    }
}

/// Builder for [`HandlerRegistry`]. Registration errors surface from
/// [`build`](Self::build).
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
    error: Option<RouterError>,
}

impl HandlerRegistryBuilder {
    /// Register `handler` for `message_type`.
    pub fn handler<H: Handler>(mut self, message_type: impl Into<String>, handler: H) -> Self {
        if self.error.is_some() {
            return self;
        }
        let message_type = message_type.into();
        if message_type.is_empty() {
            self.error = Some(RouterError::EmptyMessageType);
        } else if self.handlers.contains_key(&message_type) {
            self.error = Some(RouterError::DuplicateHandler { message_type });
        } else {
            self.handlers.insert(message_type, Arc::new(handler));
        }
        self
    }

    /// Freeze the registry. Fails with the first registration error.
    pub fn build(self) -> Result<HandlerRegistry, RouterError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        Ok(HandlerRegistry {
            handlers: Arc::new(self.handlers),
        })
    }
}
