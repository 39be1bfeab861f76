//! Lock-free token bucket.
//!
//! State is a single "theoretical arrival time" (TAT) in clock nanoseconds: the instant at which
//! the bucket would be full again if nothing else were taken. With `T` the time to refill one
//! token and `C` the capacity:
//!
//! - available tokens at `now` = `(now + C*T - max(tat, now)) / T`
//! - taking `n` tokens moves `tat` to `max(tat, now) + n*T`, allowed while the result stays
//!   within `now + C*T`.
//!
//! This is a token bucket refilling continuously at `C` tokens per period, capped at `C`,
//! updated with a compare-and-swap loop. A fresh bucket is full.

use crate::clock::{Clock, MonotonicClock};
use crate::rate_limit::{Bandwidth, BucketError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A token bucket shared by every caller using the same rate-limit key.
#[derive(Debug)]
pub struct TokenBucket {
    bandwidth: Bandwidth,
    interval_nanos: u64,
    tolerance_nanos: u64,
    tat: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl TokenBucket {
    /// A full bucket driven by a [`MonotonicClock`].
    pub fn new(bandwidth: Bandwidth) -> Self {
        Self::with_clock(bandwidth, Arc::new(MonotonicClock::default()))
    }

    /// A full bucket driven by `clock`.
    pub fn with_clock(bandwidth: Bandwidth, clock: Arc<dyn Clock>) -> Self {
        let interval_nanos =
            u64::try_from(bandwidth.token_interval().as_nanos()).unwrap_or(u64::MAX);
        let tolerance_nanos = interval_nanos.saturating_mul(u64::from(bandwidth.capacity()));
        Self { bandwidth, interval_nanos, tolerance_nanos, tat: AtomicU64::new(0), clock }
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    pub fn capacity(&self) -> u32 {
        self.bandwidth.capacity()
    }

    /// Take `n` tokens if they are available right now. Never waits; on failure nothing changes.
    pub fn try_consume(&self, n: u32) -> bool {
        if n == 0 {
            return true;
        }
        if n > self.capacity() {
            return false;
        }
        let cost = self.cost(n);
        let mut current = self.tat.load(Ordering::Acquire);
        loop {
            let now = self.clock.now_nanos();
            let Some(next) = current.max(now).checked_add(cost) else {
                return false;
            };
            if next - now > self.tolerance_nanos {
                return false;
            }
            match self.tat.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Take `n` tokens, waiting on the tokio timer until they are available.
    ///
    /// The calling task is suspended, not its thread. If another caller takes the refilled
    /// tokens first the wait is recomputed and repeated. Dropping the returned future before it
    /// completes takes nothing.
    pub async fn consume_after_wait(&self, n: u32) -> Result<(), BucketError> {
        loop {
            if self.try_consume(n) {
                return Ok(());
            }
            match self.time_until_available(n) {
                None => {
                    return Err(BucketError::CapacityExceeded {
                        requested: n,
                        capacity: self.capacity(),
                    })
                }
                Some(wait) if wait.is_zero() => tokio::task::yield_now().await,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Whole tokens available right now.
    pub fn available_tokens(&self) -> u32 {
        let now = self.clock.now_nanos();
        let tat = self.tat.load(Ordering::Acquire).max(now);
        let headroom = self.tolerance_nanos.saturating_sub(tat - now);
        u32::try_from(headroom / self.interval_nanos).unwrap_or(u32::MAX).min(self.capacity())
    }

    /// How long until `n` tokens are available, `None` if `n` exceeds the capacity.
    pub fn time_until_available(&self, n: u32) -> Option<Duration> {
        if n > self.capacity() {
            return None;
        }
        let now = self.clock.now_nanos();
        let tat = self.tat.load(Ordering::Acquire).max(now);
        let ready_at = tat.saturating_add(self.cost(n)).saturating_sub(self.tolerance_nanos);
        Some(Duration::from_nanos(ready_at.saturating_sub(now)))
    }

    fn cost(&self, n: u32) -> u64 {
        self.interval_nanos.saturating_mul(u64::from(n))
    }
}
