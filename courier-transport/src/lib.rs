//! # courier-transport
//!
//! Request/response correlation for courier envelopes.
//!
//! This crate provides:
//! - **Router**: pending-token table, reply delivery and timeouts
//! - **Handlers**: a frozen registry dispatching unmatched envelopes by type
//! - **Configuration**: deadlines and limits in [`RouterConfig`]
//!
//! The router does no I/O of its own. A transport feeds it inbound bytes or
//! envelopes and sends whatever it returns.
//!
//! ```
//! use courier_core::Envelope;
//! use courier_transport::{Router, RouterConfig, Routed};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let router = Router::builder(RouterConfig::new("node-1")).build()?;
//!
//! let (request, pending) = router.request("ping", &b"1"[..]).register()?;
//! // ...send `request`, then feed the answer back in:
//! let pong = Envelope::reply_to(&request, "pong", &b"2"[..], "peer-7");
//! assert!(matches!(router.route(pong).await?, Routed::Resolved { .. }));
//!
//! let reply = pending.wait().await?;
//! assert_eq!(reply.message_type(), "pong");
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub use courier_core::{
    CodecError, CorrelationToken, Envelope, EnvelopeBatch, EnvelopeError, JsonCodec, MessageCodec,
    RandomTokenGenerator, SequentialTokenGenerator, TimeProvider, TokenGenerator,
    TokioTimeProvider,
};

/// Router configuration.
pub mod config;

/// Error types for routing and reply delivery.
pub mod error;

/// Correlation router and handler dispatch.
pub mod router;

pub use config::RouterConfig;
pub use error::{ReplyError, RouterError};
pub use router::{
    Handler, HandlerError, HandlerRegistry, HandlerRegistryBuilder, PendingReply, PendingStats,
    ReplyResult, Reply, RequestBuilder, Routed, Router, RouterBuilder,
};
