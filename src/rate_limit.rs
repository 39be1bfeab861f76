//! Rate limiting primitives.
//!
//! - [`TokenBucket`]: a continuously refilling bucket with non-blocking and scheduled
//!   consumption.
//! - [`BucketRegistry`]: maps a [`RateLimitKey`] to its bucket, creating each bucket once.
//! - [`EndpointScope`]: endpoints whose limit is shared per target resource rather than per
//!   credential.
//!
//! Principal buckets and endpoint buckets are independent; a request may need a token from
//! both.

use crate::config::ConfigError;
use std::fmt;
use std::time::Duration;

pub mod bucket;
pub mod endpoint;
pub mod registry;

pub use bucket::TokenBucket;
pub use endpoint::EndpointScope;
pub use registry::BucketRegistry;

/// Selects the bucket that governs a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    /// An authenticated principal (client id and/or user id).
    Principal(String),
    /// A shared-capacity endpoint, keyed by the resource it targets.
    Endpoint { scope: EndpointScope, resource: String },
}

impl RateLimitKey {
    pub fn principal(id: impl Into<String>) -> Self {
        Self::Principal(id.into())
    }

    pub fn endpoint(scope: EndpointScope, resource: impl Into<String>) -> Self {
        Self::Endpoint { scope, resource: resource.into() }
    }

    pub fn is_endpoint(&self) -> bool {
        matches!(self, Self::Endpoint { .. })
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Principal(id) => write!(f, "principal:{id}"),
            Self::Endpoint { scope, resource } => write!(f, "{}:{resource}", scope.name()),
        }
    }
}

/// `capacity` tokens, refilled continuously over `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bandwidth {
    capacity: u32,
    period: Duration,
}

impl Bandwidth {
    /// Helix's per-credential budget: 800 requests per minute.
    pub const HELIX_DEFAULT: Bandwidth = Bandwidth { capacity: 800, period: Duration::from_secs(60) };

    /// Ban/unban budget per channel: 100 requests per 30 seconds.
    pub const MODERATION_BANS: Bandwidth =
        Bandwidth { capacity: 100, period: Duration::from_secs(30) };

    pub fn new(capacity: u32, period: Duration) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if period.is_zero() {
            return Err(ConfigError::ZeroPeriod);
        }
        // A full bucket spans `interval * capacity` nanoseconds of clock time.
        let interval = period.as_nanos().div_ceil(u128::from(capacity));
        if interval.saturating_mul(u128::from(capacity)) > u128::from(u64::MAX) {
            return Err(ConfigError::PeriodTooLong(period));
        }
        Ok(Self { capacity, period })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time to refill one token, rounded up to whole nanoseconds so the effective rate never
    /// exceeds the configured one.
    pub fn token_interval(&self) -> Duration {
        let nanos = self.period.as_nanos().div_ceil(u128::from(self.capacity)).max(1);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl Default for Bandwidth {
    fn default() -> Self {
        Self::HELIX_DEFAULT
    }
}

/// Errors from bucket operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BucketError {
    /// More tokens were requested than the bucket can ever hold.
    #[error("requested {requested} tokens but bucket capacity is {capacity}")]
    CapacityExceeded { requested: u32, capacity: u32 },
}
