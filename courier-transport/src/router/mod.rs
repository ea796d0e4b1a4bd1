//! Correlation router.
//!
//! The router sits between a transport and the application:
//!
//! - outbound requests are registered through [`Router::request`], which
//!   assigns a correlation token and records an expectation;
//! - inbound envelopes go through [`Router::route`] (or
//!   [`Router::route_bytes`] for raw batches). An envelope whose token
//!   matches a pending request resolves it; anything else is dispatched by
//!   message type to the [`HandlerRegistry`].
//!
//! The router never performs network I/O. Replies produced by handlers are
//! handed back to the caller as [`Routed::Replied`] with the destination
//! identity, and the transport sends them.

mod handler;
mod pending;
mod pending_reply;
mod request_builder;

use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use courier_core::{
    CorrelationToken, Envelope, EnvelopeBatch, EnvelopeError, RandomTokenGenerator, TimeProvider,
    TokenGenerator, TokioTimeProvider,
};

use crate::config::RouterConfig;
use crate::error::RouterError;

pub use handler::{Handler, HandlerError, HandlerRegistry, HandlerRegistryBuilder, Reply};
pub use pending::{PendingStats, ReplyResult};
pub use pending_reply::PendingReply;
pub use request_builder::RequestBuilder;

use pending::{EntryId, InsertError, PendingEntry, PendingTable};

/// Outcome of routing one inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// The envelope answered a pending request and was delivered to it.
    Resolved {
        /// Token of the resolved request.
        token: CorrelationToken,
    },

    /// A handler consumed the envelope without replying.
    Handled {
        /// Type tag of the envelope.
        message_type: String,
        /// Token of the envelope.
        token: CorrelationToken,
    },

    /// A handler produced a reply for the transport to send.
    Replied {
        /// Identity of the connection the request arrived on.
        destination: String,
        /// Reply envelope, carrying the request's token.
        reply: Envelope,
    },
}

/// Request/response correlation and type dispatch.
///
/// Cheap to clone; clones share the pending table and handlers.
#[derive(Clone)]
pub struct Router<T: TimeProvider = TokioTimeProvider> {
    config: RouterConfig,
    pending: Arc<PendingTable>,
    handlers: HandlerRegistry,
    tokens: Arc<dyn TokenGenerator>,
    time: T,
}

impl Router<TokioTimeProvider> {
    /// Start building a router on the Tokio clock.
    pub fn builder(config: RouterConfig) -> RouterBuilder<TokioTimeProvider> {
        RouterBuilder::new(config)
    }
}

impl<T: TimeProvider> Router<T> {
    /// Start describing an outbound request.
    pub fn request(
        &self,
        message_type: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> RequestBuilder<'_, T> {
        RequestBuilder::new(self, message_type.into(), payload.into())
    }

    /// Route one inbound envelope.
    ///
    /// A pending request with the envelope's token takes precedence over
    /// type dispatch. With neither, the envelope is returned to the caller
    /// as [`RouterError::UnroutableMessage`] so it can answer negatively.
    pub async fn route(&self, envelope: Envelope) -> Result<Routed, RouterError> {
        if self.pending.is_closed() {
            return Err(RouterError::Closed);
        }

        let token = envelope.correlation_token().clone();
        let envelope = match self.pending.resolve(envelope) {
            Ok(()) => return Ok(Routed::Resolved { token }),
            Err(unmatched) => unmatched,
        };
        self.dispatch(envelope).await
    }

    /// Decode a batch received from `sender_identity` and route every
    /// element in order.
    ///
    /// Oversized or malformed bytes fail as a whole before anything is
    /// routed. Otherwise each element gets its own result.
    pub async fn route_bytes(
        &self,
        sender_identity: &str,
        bytes: &[u8],
    ) -> Result<Vec<Result<Routed, RouterError>>, RouterError> {
        let batch = self.decode_inbound(sender_identity, bytes)?;

        let mut results = Vec::with_capacity(batch.len());
        for envelope in batch {
            results.push(self.route(envelope).await);
        }
        Ok(results)
    }

    fn decode_inbound(
        &self,
        sender_identity: &str,
        bytes: &[u8],
    ) -> Result<EnvelopeBatch, RouterError> {
        let max = self.config.max_envelope_size;
        let result = if bytes.len() > max {
            Err(EnvelopeError::TooLarge {
                size: bytes.len(),
                max,
            })
        } else {
            EnvelopeBatch::decode_from_peer(bytes, sender_identity)
        };

        result.map_err(|err| {
            tracing::warn!(
                sender = %sender_identity,
                len = bytes.len(),
                error = %err,
                "dropping inbound bytes"
            );
            RouterError::from(err)
        })
    }

    async fn dispatch(&self, envelope: Envelope) -> Result<Routed, RouterError> {
        let Some(handler) = self.handlers.get(envelope.message_type()) else {
            tracing::warn!(
                message_type = %envelope.message_type(),
                token = %envelope.correlation_token(),
                sender = %envelope.sender_identity(),
                "unroutable message"
            );
            let (message_type, correlation_token, _, sender_identity) = envelope.into_parts();
            return Err(RouterError::UnroutableMessage {
                message_type,
                correlation_token,
                sender_identity,
            });
        };

        tracing::debug!(
            message_type = %envelope.message_type(),
            token = %envelope.correlation_token(),
            sender = %envelope.sender_identity(),
            "dispatching to handler"
        );
        match handler.dispatch(&envelope).await? {
            Some(reply) => {
                let reply = Envelope::reply_to(
                    &envelope,
                    reply.message_type,
                    reply.payload,
                    self.config.local_identity.clone(),
                );
                Ok(Routed::Replied {
                    destination: envelope.sender_identity().to_string(),
                    reply,
                })
            }
            None => {
                let (message_type, token, _, _) = envelope.into_parts();
                Ok(Routed::Handled {
                    message_type,
                    token,
                })
            }
        }
    }

    /// Expire every pending request whose deadline has passed.
    ///
    /// Requests registered with [`RequestBuilder::on_reply`] only time out
    /// through this call (or [`spawn_sweeper`](Self::spawn_sweeper)).
    pub fn sweep_expired(&self) -> usize {
        self.pending.expire_overdue(self.time.now())
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` until the
    /// router shuts down or every handle to it has been dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let table: Weak<PendingTable> = Arc::downgrade(&self.pending);
        let time = self.time.clone();
        tokio::spawn(async move {
            loop {
                if time.sleep(interval).await.is_err() {
                    break;
                }
                let Some(pending) = table.upgrade() else {
                    tracing::debug!("router dropped, sweeper exiting");
                    break;
                };
                if pending.is_closed() {
                    break;
                }
                pending.expire_overdue(time.now());
            }
        })
    }

    /// Deregister a pending request without firing its continuation.
    pub fn abandon(&self, token: &CorrelationToken) -> bool {
        self.pending.abandon(token, None)
    }

    /// Whether `token` is awaiting a reply.
    pub fn is_pending(&self, token: &CorrelationToken) -> bool {
        self.pending.contains(token)
    }

    /// Number of requests awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Lifetime counters.
    pub fn stats(&self) -> PendingStats {
        self.pending.stats()
    }

    /// Close the router. Every pending request fails with `RouterClosed`,
    /// later registrations fail with [`RouterError::Closed`].
    pub fn shutdown(&self) -> usize {
        let failed = self.pending.close();
        tracing::info!(failed, "router shut down");
        failed
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.pending.is_closed()
    }

    /// Router configuration.
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Registered handlers.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub(crate) fn insert_pending(
        &self,
        token: Option<CorrelationToken>,
        entry: PendingEntry,
    ) -> Result<(CorrelationToken, EntryId), RouterError> {
        let limit = self.config.max_pending;

        if let Some(token) = token {
            return match self.pending.insert(token.clone(), entry, limit) {
                Ok(id) => Ok((token, id)),
                Err((err, _)) => Err(self.insert_error(err, token)),
            };
        }

        let attempts = self.config.token_attempts.max(1);
        let mut entry = entry;
        for _ in 0..attempts {
            let token = self.tokens.next_token();
            match self.pending.insert(token.clone(), entry, limit) {
                Ok(id) => return Ok((token, id)),
                Err((InsertError::Occupied, returned)) => {
                    tracing::debug!(token = %token, "generated token already pending, retrying");
                    entry = returned;
                }
                Err((err, _)) => return Err(self.insert_error(err, token)),
            }
        }

        tracing::warn!(attempts, "no unused correlation token");
        Err(RouterError::TokenCollision { attempts })
    }

    fn insert_error(&self, err: InsertError, token: CorrelationToken) -> RouterError {
        match err {
            InsertError::Occupied => RouterError::TokenInUse { token },
            InsertError::Full => RouterError::TooManyPending {
                limit: self.config.max_pending,
            },
            InsertError::Closed => RouterError::Closed,
        }
    }
}

impl<T: TimeProvider> std::fmt::Debug for Router<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("local_identity", &self.config.local_identity)
            .field("pending", &self.pending.len())
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// Builder for [`Router`].
pub struct RouterBuilder<T: TimeProvider = TokioTimeProvider> {
    config: RouterConfig,
    handlers: HandlerRegistryBuilder,
    tokens: Option<Arc<dyn TokenGenerator>>,
    time: T,
}

impl RouterBuilder<TokioTimeProvider> {
    /// Builder with the given configuration on the Tokio clock.
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            handlers: HandlerRegistry::builder(),
            tokens: None,
            time: TokioTimeProvider::new(),
        }
    }
}

impl<T: TimeProvider> RouterBuilder<T> {
    /// Replace the configuration.
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a handler for `message_type`.
    pub fn handler<H: Handler>(mut self, message_type: impl Into<String>, handler: H) -> Self {
        self.handlers = self.handlers.handler(message_type, handler);
        self
    }

    /// Use `generator` for tokens instead of [`RandomTokenGenerator`].
    pub fn token_generator(mut self, generator: impl TokenGenerator + 'static) -> Self {
        self.tokens = Some(Arc::new(generator));
        self
    }

    /// Measure deadlines with `time`.
    pub fn time_provider<U: TimeProvider>(self, time: U) -> RouterBuilder<U> {
        RouterBuilder {
            config: self.config,
            handlers: self.handlers,
            tokens: self.tokens,
            time,
        }
    }

    /// Build the router. Fails on duplicate or empty handler registrations.
    pub fn build(self) -> Result<Router<T>, RouterError> {
        let handlers = self.handlers.build()?;
        let tokens = self
            .tokens
            .unwrap_or_else(|| Arc::new(RandomTokenGenerator::new()));

        tracing::debug!(
            local_identity = %self.config.local_identity,
            handlers = handlers.len(),
            "router built"
        );
        Ok(Router {
            config: self.config,
            pending: Arc::new(PendingTable::new()),
            handlers,
            tokens,
            time: self.time,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use courier_core::{CodecError, SequentialTokenGenerator};

    use super::*;
    use crate::error::ReplyError;

    struct Echo;

    #[async_trait]
    impl Handler for Echo {
        type Request = Bytes;

        fn parse(&self, payload: &Bytes) -> Result<Bytes, CodecError> {
            Ok(payload.clone())
        }

        async fn handle(
            &self,
            request: Bytes,
            _envelope: &Envelope,
        ) -> Result<Option<Reply>, HandlerError> {
            Ok(Some(Reply::new("echo-reply", request)))
        }
    }

    fn router() -> Router {
        Router::builder(RouterConfig::new("node-1"))
            .handler("echo", Echo)
            .token_generator(SequentialTokenGenerator::new("req"))
            .build()
            .expect("build")
    }

    #[tokio::test]
    async fn test_register_builds_outbound_envelope() {
        let router = router();
        let (envelope, pending) = router.request("ping", &b"1"[..]).register().expect("register");

        assert_eq!(envelope.message_type(), "ping");
        assert_eq!(envelope.correlation_token(), &CorrelationToken::from("req-1"));
        assert_eq!(envelope.sender_identity(), "node-1");
        assert_eq!(pending.token(), envelope.correlation_token());
        assert!(router.is_pending(pending.token()));
    }

    #[tokio::test]
    async fn test_route_prefers_pending_over_handler() {
        let router = router();
        let (_envelope, pending) = router
            .request("echo", &b"x"[..])
            .with_token("t-9")
            .register()
            .expect("register");

        let inbound = Envelope::new("echo", "t-9", &b"y"[..], "peer-1");
        let routed = router.route(inbound.clone()).await.expect("route");
        assert_eq!(
            routed,
            Routed::Resolved {
                token: CorrelationToken::from("t-9")
            }
        );
        assert_eq!(pending.wait().await, Ok(inbound));
    }

    #[tokio::test]
    async fn test_handler_reply_targets_sender() {
        let router = router();
        let inbound = Envelope::new("echo", "t-1", &b"hello"[..], "peer-1");

        let routed = router.route(inbound).await.expect("route");
        let Routed::Replied { destination, reply } = routed else {
            panic!("expected a reply, got {routed:?}");
        };
        assert_eq!(destination, "peer-1");
        assert_eq!(reply.message_type(), "echo-reply");
        assert_eq!(reply.correlation_token(), &CorrelationToken::from("t-1"));
        assert_eq!(reply.payload().as_ref(), b"hello");
        assert_eq!(reply.sender_identity(), "node-1");
    }

    #[tokio::test]
    async fn test_empty_message_type_is_unroutable() {
        let router = router();
        let err = router
            .route(Envelope::new("", "t-1", Bytes::new(), "peer-1"))
            .await
            .expect_err("unroutable");
        assert!(err.is_unroutable());
    }

    #[tokio::test]
    async fn test_dropping_pending_reply_deregisters() {
        let router = router();
        let (envelope, pending) = router
            .request("ping", Bytes::new())
            .register()
            .expect("register");
        drop(pending);

        assert!(!router.is_pending(envelope.correlation_token()));
        assert_eq!(router.stats().abandoned, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_deregisters() {
        let router = router();
        let (envelope, pending) = router
            .request("ping", Bytes::new())
            .with_timeout(Duration::from_secs(30))
            .register()
            .expect("register");

        let outcome = tokio::time::timeout(Duration::from_millis(10), pending.wait()).await;
        assert!(outcome.is_err(), "wait should still be in flight");

        assert!(!router.is_pending(envelope.correlation_token()));
        assert_eq!(router.pending_count(), 0);
        assert_eq!(router.stats().abandoned, 1);
        assert_eq!(router.stats().expired, 0);
    }

    #[tokio::test]
    async fn test_external_abandon_wakes_waiter() {
        let router = router();
        let (envelope, pending) = router
            .request("ping", Bytes::new())
            .register()
            .expect("register");

        assert!(router.abandon(envelope.correlation_token()));
        assert_eq!(pending.wait().await, Err(ReplyError::Abandoned));
    }

    #[tokio::test]
    async fn test_explicit_abandon_reports_outcome() {
        let router = router();
        let (envelope, pending) = router
            .request("ping", Bytes::new())
            .register()
            .expect("register");
        assert!(pending.abandon());

        let (_, second) = router
            .request("ping", Bytes::new())
            .register()
            .expect("register");
        router
            .route(Envelope::reply_to(&envelope, "pong", Bytes::new(), "peer-1"))
            .await
            .expect_err("reply to abandoned request is unsolicited");
        assert!(router.is_pending(second.token()));
    }

    #[tokio::test]
    async fn test_route_after_shutdown_is_closed() {
        let router = router();
        router.shutdown();
        let err = router
            .route(Envelope::new("echo", "t-1", Bytes::new(), "peer-1"))
            .await
            .expect_err("closed");
        assert!(matches!(err, RouterError::Closed));
    }
}
