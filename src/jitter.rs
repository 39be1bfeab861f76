//! Jitter applied to backoff delays.
//!
//! - `None`: exact delays; use in tests and anywhere determinism matters.
//! - `Full`: uniform in `[0, delay]`.
//! - `Equal`: uniform in `[delay/2, delay]`, keeping a floor under the wait.
//!
//! Randomness comes from `rand`'s thread-local RNG; `apply_with_rng` accepts a seeded one.

use rand::{rng, Rng};
use std::time::Duration;

/// Jitter strategy for randomizing retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Use the delay unchanged.
    None,
    /// Random between 0 and the delay.
    #[default]
    Full,
    /// Random between half the delay and the delay.
    Equal,
}

impl Jitter {
    pub fn full() -> Self {
        Jitter::Full
    }

    pub fn equal() -> Self {
        Jitter::Equal
    }

    /// Randomize `delay` using the thread-local RNG.
    pub fn apply(&self, delay: Duration) -> Duration {
        self.apply_with_rng(delay, &mut rng())
    }

    /// Randomize `delay` with a caller-supplied RNG.
    pub fn apply_with_rng<R: Rng + ?Sized>(&self, delay: Duration, rng: &mut R) -> Duration {
        let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        match self {
            Jitter::None => delay,
            _ if nanos == 0 => Duration::ZERO,
            Jitter::Full => Duration::from_nanos(rng.random_range(0..=nanos)),
            Jitter::Equal => Duration::from_nanos(rng.random_range(nanos / 2..=nanos)),
        }
    }
}
