//! Random number generation provider abstraction.
//!
//! Token generation draws its entropy through this trait so tests and
//! simulations can substitute a seeded source.

use rand::distr::{Distribution, StandardUniform};
use rand::prelude::*;
use std::cell::RefCell;

/// Provider trait for random number generation.
pub trait RandomProvider: Clone + Send + Sync + 'static {
    /// Generate a random value of type T.
    fn random<T>(&self) -> T
    where
        StandardUniform: Distribution<T>;
}

/// Production random provider using a thread-local RNG.
///
/// # Example
///
/// ```rust
/// use courier_core::{RandomProvider, SystemRandomProvider};
///
/// let random = SystemRandomProvider::new();
/// let value: u64 = random.random();
/// # let _ = value;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRandomProvider;

impl SystemRandomProvider {
    /// Create a new production random provider.
    pub fn new() -> Self {
        Self
    }
}

thread_local! {
    static RNG: RefCell<rand::rngs::ThreadRng> = RefCell::new(rand::rng());
}

impl RandomProvider for SystemRandomProvider {
    fn random<T>(&self) -> T
    where
        StandardUniform: Distribution<T>,
    {
        RNG.with(|rng| rng.borrow_mut().random())
    }
}

/// Seeded provider for reproducible token sequences.
///
/// Clones share the same generator state.
#[derive(Debug, Clone)]
pub struct SeededRandomProvider {
    rng: std::sync::Arc<std::sync::Mutex<rand::rngs::StdRng>>,
}

impl SeededRandomProvider {
    /// Create a provider whose output is fully determined by `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: std::sync::Arc::new(std::sync::Mutex::new(rand::rngs::StdRng::seed_from_u64(
                seed,
            ))),
        }
    }
}

impl RandomProvider for SeededRandomProvider {
    fn random<T>(&self) -> T
    where
        StandardUniform: Distribution<T>,
    {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        rng.random()
    }
}
