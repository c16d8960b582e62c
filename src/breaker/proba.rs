//! Sources of randomness for the admission gate.

use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Answers "should this happen?" for a given probability.
///
/// This is the only place the breaker draws randomness from, so tests can swap
/// in a seeded or fixed implementation.
pub trait Proba: fmt::Debug + Send + Sync + 'static {
    /// Returns `true` with probability `proba`, clamped to `[0, 1]`.
    fn true_on_proba(&self, proba: f64) -> bool;
}

/// Draws from the thread-local generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomProba;

impl Proba for RandomProba {
    fn true_on_proba(&self, proba: f64) -> bool {
        rand::random::<f64>() < proba.clamp(0.0, 1.0)
    }
}

/// Reproducible sequence of decisions from a fixed seed.
pub struct SeededProba {
    rng: Mutex<StdRng>,
}

impl SeededProba {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl fmt::Debug for SeededProba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeededProba").finish_non_exhaustive()
    }
}

impl Proba for SeededProba {
    fn true_on_proba(&self, proba: f64) -> bool {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.random::<f64>() < proba.clamp(0.0, 1.0)
    }
}
