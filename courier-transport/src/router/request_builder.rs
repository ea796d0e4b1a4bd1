//! Request builder for registering outbound requests.
//!
//! Registration picks a token, records the expectation in the pending table
//! and returns the envelope to send. The caller chooses how the reply is
//! delivered:
//!
//! ```rust,ignore
//! // Await it:
//! let (envelope, pending) = router.request("ping", payload).register()?;
//! transport.send(envelope).await?;
//! let pong = pending.wait().await?;
//!
//! // Or hand it to a callback, driven by `sweep_expired` for deadlines:
//! let envelope = router
//!     .request("ping", payload)
//!     .with_timeout(Duration::from_secs(5))
//!     .on_reply(|result| tracing::info!(?result, "ping answered"))?;
//! ```

use std::time::Duration;

use bytes::Bytes;
use courier_core::{CorrelationToken, Envelope, TimeProvider};
use tokio::sync::oneshot;

use super::pending::{Continuation, EntryId, PendingEntry, ReplyResult};
use super::pending_reply::PendingReply;
use super::Router;
use crate::error::RouterError;

/// Builder for one outbound request.
///
/// Created via [`Router::request`].
#[must_use = "a request is only registered by `register` or `on_reply`"]
pub struct RequestBuilder<'a, T: TimeProvider> {
    router: &'a Router<T>,
    message_type: String,
    payload: Bytes,
    token: Option<CorrelationToken>,
    timeout: Option<Duration>,
}

impl<'a, T: TimeProvider> RequestBuilder<'a, T> {
    pub(crate) fn new(router: &'a Router<T>, message_type: String, payload: Bytes) -> Self {
        Self {
            router,
            message_type,
            payload,
            token: None,
            timeout: None,
        }
    }

    /// Use `token` instead of drawing one from the router's generator.
    ///
    /// Registration fails with [`RouterError::TokenInUse`] if the token is
    /// already pending.
    pub fn with_token(mut self, token: impl Into<CorrelationToken>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Override the router's default deadline for this request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Register the request with an awaitable reply slot.
    ///
    /// Returns the envelope to send and the handle to await.
    pub fn register(self) -> Result<(Envelope, PendingReply<T>), RouterError> {
        let router = self.router;
        let (sender, receiver) = oneshot::channel();
        let (envelope, id, deadline) = self.insert(Continuation::Slot(sender))?;

        let pending = PendingReply::new(
            envelope.correlation_token().clone(),
            id,
            deadline,
            receiver,
            router.pending.clone(),
            router.time.clone(),
        );
        Ok((envelope, pending))
    }

    /// Register the request with a callback.
    ///
    /// The callback runs exactly once with the reply, `Timeout` (from
    /// [`Router::sweep_expired`]) or `RouterClosed`, unless the request is
    /// abandoned first.
    pub fn on_reply<F>(self, callback: F) -> Result<Envelope, RouterError>
    where
        F: FnOnce(ReplyResult) + Send + 'static,
    {
        let (envelope, _, _) = self.insert(Continuation::Callback(Box::new(callback)))?;
        Ok(envelope)
    }

    fn insert(
        self,
        continuation: Continuation,
    ) -> Result<(Envelope, EntryId, Duration), RouterError> {
        let router = self.router;
        let timeout = self.timeout.unwrap_or(router.config.default_timeout);
        let deadline = router.time.now().saturating_add(timeout);

        let entry = PendingEntry {
            continuation,
            message_type: self.message_type.clone(),
            deadline,
        };
        let (token, id) = router.insert_pending(self.token, entry)?;

        tracing::debug!(
            token = %token,
            message_type = %self.message_type,
            timeout_ms = timeout.as_millis() as u64,
            "registered pending request"
        );
        let envelope = Envelope::new(
            self.message_type,
            token,
            self.payload,
            router.config.local_identity.clone(),
        );
        Ok((envelope, id, deadline))
    }
}
