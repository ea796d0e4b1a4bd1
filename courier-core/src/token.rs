//! Correlation tokens and their generators.
//!
//! A token only has to be unique among the sender's outstanding requests,
//! so generators aim for collision resistance, not secrecy. The router
//! re-draws when a generated token is already pending.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::random::{RandomProvider, SystemRandomProvider};

/// Caller-chosen string linking a request to its eventual reply.
///
/// # Examples
///
/// ```
/// use courier_core::CorrelationToken;
///
/// let token = CorrelationToken::from("abc123");
/// assert_eq!(token.as_str(), "abc123");
/// assert_eq!(token.to_string(), "abc123");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Wrap an existing token string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the token is the empty string.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unwrap into the underlying string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CorrelationToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for CorrelationToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl AsRef<str> for CorrelationToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for CorrelationToken {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for CorrelationToken {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Source of fresh correlation tokens.
pub trait TokenGenerator: Send + Sync {
    /// Produce the next token.
    fn next_token(&self) -> CorrelationToken;
}

/// 128 random bits rendered as 32 lowercase hex characters.
///
/// # Examples
///
/// ```
/// use courier_core::{RandomTokenGenerator, TokenGenerator};
///
/// let tokens = RandomTokenGenerator::new();
/// let token = tokens.next_token();
/// assert_eq!(token.as_str().len(), 32);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RandomTokenGenerator<R: RandomProvider = SystemRandomProvider> {
    random: R,
}

impl RandomTokenGenerator<SystemRandomProvider> {
    /// Generator backed by the thread-local system RNG.
    pub fn new() -> Self {
        Self {
            random: SystemRandomProvider,
        }
    }
}

impl<R: RandomProvider> RandomTokenGenerator<R> {
    /// Generator backed by the given random provider.
    pub fn with_provider(random: R) -> Self {
        Self { random }
    }
}

impl<R: RandomProvider> TokenGenerator for RandomTokenGenerator<R> {
    fn next_token(&self) -> CorrelationToken {
        let first: u64 = self.random.random();
        let second: u64 = self.random.random();
        CorrelationToken(format!("{:016x}{:016x}", first, second))
    }
}

/// Monotonic `prefix-N` tokens, starting at 1.
///
/// Deterministic and unique per generator instance, which is what tests and
/// traces want. Not suitable when several processes share one token space.
#[derive(Debug)]
pub struct SequentialTokenGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialTokenGenerator {
    /// Create a generator emitting `{prefix}-1`, `{prefix}-2`, ...
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl TokenGenerator for SequentialTokenGenerator {
    fn next_token(&self) -> CorrelationToken {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        CorrelationToken(format!("{}-{}", self.prefix, n))
    }
}
