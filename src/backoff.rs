//! Backoff curves and the stateful failure-counting backoff primitive.
//!
//! [`Backoff`] is a pure curve: `delay(attempt)` with attempt `0` meaning "no delay". Retry
//! policies evaluate it directly.
//!
//! [`BackoffStrategy`] is the stateful side used by long-lived retry sites (reconnect loops and
//! the like). Each failure bumps a counter; the counter picks a point on the curve.
//!
//! ```rust
//! use std::time::Duration;
//! use helix_gate::backoff::{BackoffStrategy, ExponentialBackoffStrategy};
//! use helix_gate::Jitter;
//!
//! let backoff = ExponentialBackoffStrategy::builder()
//!     .base(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(1))
//!     .immediate_first(false)
//!     .jitter(Jitter::None)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(backoff.get(), Duration::from_millis(100));
//! assert_eq!(backoff.get(), Duration::from_millis(200));
//! assert_eq!(backoff.failures(), 2);
//! backoff.reset();
//! assert_eq!(backoff.failures(), 0);
//! ```
//!
//! Overflow saturates to [`MAX_BACKOFF`] (1 day).

use crate::Jitter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Largest delay any curve produces.
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffError {
    #[error("with_max is only valid for linear or exponential backoff")]
    ConstantDoesNotSupportMax,
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= base ({base:?})")]
    MaxLessThanBase { base: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Curve {
    Constant,
    Linear,
    Exponential,
}

/// A delay curve indexed by attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    curve: Curve,
    base: Duration,
    max: Option<Duration>,
}

impl Backoff {
    pub fn constant(delay: Duration) -> Self {
        Self { curve: Curve::Constant, base: delay, max: None }
    }

    pub fn linear(base: Duration) -> Self {
        Self { curve: Curve::Linear, base, max: None }
    }

    /// `base * 2^(attempt - 1)`.
    pub fn exponential(base: Duration) -> Self {
        Self { curve: Curve::Exponential, base, max: None }
    }

    /// Cap a linear or exponential curve. Rejects zero caps and caps below `base`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        if self.curve == Curve::Constant {
            return Err(BackoffError::ConstantDoesNotSupportMax);
        }
        if max < self.base {
            return Err(BackoffError::MaxLessThanBase { base: self.base, max });
        }
        self.max = Some(max);
        Ok(self)
    }

    /// Delay before `attempt` (0-based; 0 is the initial call and never waits).
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let raw = match self.curve {
            Curve::Constant => self.base,
            Curve::Linear => {
                let n = attempt.min(u32::MAX as usize) as u32;
                self.base.checked_mul(n).unwrap_or(MAX_BACKOFF)
            }
            Curve::Exponential => {
                let exponent = (attempt - 1).min(u32::MAX as usize) as u32;
                let nanos = self.base.as_nanos().saturating_mul(2u128.saturating_pow(exponent));
                Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64)
            }
        };
        self.max.map_or(raw, |m| raw.min(m)).min(MAX_BACKOFF)
    }
}

/// Stateful backoff owned by a single retry site.
pub trait BackoffStrategy: Send + Sync + std::fmt::Debug {
    /// Record a failure and return how long to wait before the next attempt.
    fn get(&self) -> Duration;

    /// Block the current thread for [`get`](Self::get).
    ///
    /// Returns `false` without sleeping once the attempt budget is spent.
    fn sleep(&self) -> bool;

    /// Forget all recorded failures. Call after a successful attempt.
    fn reset(&self);

    /// Failures recorded since the last reset.
    fn failures(&self) -> usize;
}

/// Exponential [`BackoffStrategy`] with a cap, optional attempt budget and jitter.
#[derive(Debug)]
pub struct ExponentialBackoffStrategy {
    curve: Backoff,
    max_retries: Option<usize>,
    immediate_first: bool,
    jitter: Jitter,
    failures: AtomicUsize,
}

impl ExponentialBackoffStrategy {
    pub fn builder() -> ExponentialBackoffStrategyBuilder {
        ExponentialBackoffStrategyBuilder::default()
    }

    /// Remaining attempts, `None` when unbounded.
    pub fn remaining(&self) -> Option<usize> {
        self.max_retries.map(|max| max.saturating_sub(self.failures()))
    }

    fn delay_for(&self, failures: usize) -> Duration {
        let attempt = if self.immediate_first { failures - 1 } else { failures };
        self.jitter.apply(self.curve.delay(attempt))
    }
}

impl Default for ExponentialBackoffStrategy {
    fn default() -> Self {
        let curve =
            Backoff { curve: Curve::Exponential, base: DEFAULT_BASE, max: Some(DEFAULT_MAX_DELAY) };
        ExponentialBackoffStrategyBuilder::default().assemble(curve)
    }
}

impl BackoffStrategy for ExponentialBackoffStrategy {
    fn get(&self) -> Duration {
        let failures = self
            .failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
            .map_or(usize::MAX, |prev| prev + 1);
        self.delay_for(failures)
    }

    fn sleep(&self) -> bool {
        if self.remaining() == Some(0) {
            tracing::debug!(
                target: "helix_gate::backoff",
                failures = self.failures(),
                "backoff attempt budget exhausted"
            );
            return false;
        }
        let delay = self.get();
        tracing::debug!(target: "helix_gate::backoff", failures = self.failures(), ?delay, "backing off");
        std::thread::sleep(delay);
        true
    }

    fn reset(&self) {
        self.failures.store(0, Ordering::Release);
    }

    fn failures(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }
}

const DEFAULT_BASE: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(120);

/// Builder for [`ExponentialBackoffStrategy`].
#[derive(Debug, Clone)]
pub struct ExponentialBackoffStrategyBuilder {
    base: Duration,
    max_delay: Duration,
    max_retries: Option<usize>,
    immediate_first: bool,
    jitter: Jitter,
}

impl Default for ExponentialBackoffStrategyBuilder {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries: None,
            immediate_first: true,
            jitter: Jitter::Full,
        }
    }
}

impl ExponentialBackoffStrategyBuilder {
    /// Delay after the first delayed failure.
    pub fn base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Upper bound for every delay.
    pub fn max_delay(mut self, max: Duration) -> Self {
        self.max_delay = max;
        self
    }

    /// Number of `sleep` calls allowed between resets. Unbounded by default.
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// When set, the first failure after a reset yields a zero delay.
    pub fn immediate_first(mut self, immediate: bool) -> Self {
        self.immediate_first = immediate;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn build(self) -> Result<ExponentialBackoffStrategy, BackoffError> {
        let curve = Backoff::exponential(self.base).with_max(self.max_delay)?;
        Ok(self.assemble(curve))
    }

    fn assemble(self, curve: Backoff) -> ExponentialBackoffStrategy {
        ExponentialBackoffStrategy {
            curve,
            max_retries: self.max_retries,
            immediate_first: self.immediate_first,
            jitter: self.jitter,
            failures: AtomicUsize::new(0),
        }
    }
}
