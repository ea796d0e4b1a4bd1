//! Configuration for router behavior.

use std::time::Duration;

/// Configuration for a [`Router`](crate::Router).
#[derive(Clone, Debug)]
pub struct RouterConfig {
    /// Identity written into the `sender_identity` of envelopes this router
    /// creates. Receivers overwrite it with their own view of the connection.
    pub local_identity: String,

    /// Deadline applied to requests that do not set their own.
    pub default_timeout: Duration,

    /// Maximum number of requests awaiting a reply at once.
    pub max_pending: usize,

    /// Inbound byte buffers larger than this are rejected before parsing.
    pub max_envelope_size: usize,

    /// Tokens drawn before giving up on finding one that is not pending.
    pub token_attempts: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            local_identity: String::new(),
            default_timeout: Duration::from_secs(30),
            max_pending: 10_000,
            max_envelope_size: 1024 * 1024,
            token_attempts: 8,
        }
    }
}

impl RouterConfig {
    /// Create a configuration for the given local identity.
    pub fn new(local_identity: impl Into<String>) -> Self {
        Self {
            local_identity: local_identity.into(),
            ..Self::default()
        }
    }

    /// Set the default request deadline.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the pending-request limit.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Set the inbound size bound.
    pub fn with_max_envelope_size(mut self, max_envelope_size: usize) -> Self {
        self.max_envelope_size = max_envelope_size;
        self
    }

    /// Set how many tokens are drawn before reporting a collision.
    pub fn with_token_attempts(mut self, attempts: u32) -> Self {
        self.token_attempts = attempts.max(1);
        self
    }

    /// Short deadlines for peers on the same host or rack.
    pub fn local_network() -> Self {
        Self {
            default_timeout: Duration::from_secs(2),
            max_pending: 1_000,
            ..Self::default()
        }
    }

    /// Generous deadlines for high-latency links.
    pub fn wan_network() -> Self {
        Self {
            default_timeout: Duration::from_secs(120),
            max_pending: 50_000,
            max_envelope_size: 16 * 1024 * 1024,
            ..Self::default()
        }
    }
}
