//! Clock abstractions used by token buckets.
//!
//! Buckets measure refill in nanoseconds relative to a clock-specific origin. The only
//! requirement is monotonicity: a clock must never report a smaller value than it did before.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Clock abstraction so refill timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Nanoseconds elapsed since the clock's origin.
    fn now_nanos(&self) -> u64;
}

/// Monotonic clock backed by `tokio::time::Instant`.
///
/// Follows tokio's notion of time, so a runtime started with paused time (`test-util`) drives
/// bucket refill together with `tokio::time::sleep`. Outside a paused runtime this is the
/// ordinary monotonic system clock.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: tokio::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self { start: tokio::time::Instant::now() }
    }
}

impl Clock for MonotonicClock {
    fn now_nanos(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Manually advanced clock.
///
/// Clones share the same time source.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `by`.
    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        let _ = self
            .nanos
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_add(by)));
    }
}

impl Clock for ManualClock {
    fn now_nanos(&self) -> u64 {
        self.nanos.load(Ordering::Acquire)
    }
}
