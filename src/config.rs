//! Gate configuration.
//!
//! Built in code through [`GateConfig::builder`] or loaded from JSON with
//! [`GateConfig::from_json`]. Both paths validate: zero capacities, periods, timeouts or
//! attempt counts are rejected, as is a backoff cap below its base.
//!
//! ```rust
//! use helix_gate::GateConfig;
//!
//! let config = GateConfig::from_json(r#"{
//!     "default_bandwidth": { "capacity": 800, "period_ms": 60000 },
//!     "endpoints": { "moderation_bans": { "capacity": 100, "period_ms": 30000 } },
//!     "timeout_ms": 5000,
//!     "backoff": { "base_ms": 500, "max_delay_ms": 30000, "max_retries": 5, "jitter": true },
//!     "retry_attempts": 2
//! }"#).unwrap();
//! assert_eq!(config.timeout().as_millis(), 5000);
//! ```

use crate::backoff::{Backoff, BackoffError, ExponentialBackoffStrategy};
use crate::rate_limit::{Bandwidth, BucketRegistry, EndpointScope};
use crate::Jitter;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Wait bound applied when the caller does not pass one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Total attempts for retryable (503) failures: the call plus one retry.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 2;

/// Errors produced while validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("bucket capacity must be > 0")]
    ZeroCapacity,
    #[error("bucket refill period must be > 0")]
    ZeroPeriod,
    #[error("bucket refill period {0:?} is longer than the bucket clock can represent")]
    PeriodTooLong(Duration),
    #[error("timeout must be > 0")]
    ZeroTimeout,
    #[error("retry attempts must be > 0")]
    ZeroAttempts,
    #[error("unknown endpoint scope '{0}'")]
    UnknownEndpoint(String),
    #[error("invalid backoff: {0}")]
    Backoff(#[from] BackoffError),
    #[error("invalid configuration document: {0}")]
    Parse(String),
}

/// Backoff settings. They shape the delay before a 503 is retried and the stateful backoff
/// handed to long-lived retry sites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max_delay: Duration,
    pub max_retries: Option<usize>,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
            max_retries: None,
            jitter: true,
        }
    }
}

impl BackoffConfig {
    /// Exponential curve from `base`, capped at `max_delay`.
    pub fn curve(&self) -> Result<Backoff, BackoffError> {
        Backoff::exponential(self.base).with_max(self.max_delay)
    }

    pub fn jitter(&self) -> Jitter {
        if self.jitter {
            Jitter::Full
        } else {
            Jitter::None
        }
    }

    /// A fresh strategy with these settings and a zeroed failure counter.
    pub fn strategy(&self) -> Result<ExponentialBackoffStrategy, BackoffError> {
        let mut builder = ExponentialBackoffStrategy::builder()
            .base(self.base)
            .max_delay(self.max_delay)
            .jitter(self.jitter());
        if let Some(retries) = self.max_retries {
            builder = builder.max_retries(retries);
        }
        builder.build()
    }
}

/// Validated gate configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    principal_bandwidth: Bandwidth,
    endpoint_bandwidths: HashMap<EndpointScope, Bandwidth>,
    timeout: Duration,
    backoff: BackoffConfig,
    retry_attempts: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            principal_bandwidth: Bandwidth::HELIX_DEFAULT,
            endpoint_bandwidths: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
            backoff: BackoffConfig::default(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl GateConfig {
    pub fn builder() -> GateConfigBuilder {
        GateConfigBuilder::default()
    }

    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        raw.into_config()
    }

    pub fn principal_bandwidth(&self) -> Bandwidth {
        self.principal_bandwidth
    }

    /// Effective limit for `scope`: the override if configured, else the documented limit.
    pub fn endpoint_bandwidth(&self, scope: EndpointScope) -> Bandwidth {
        self.endpoint_bandwidths.get(&scope).copied().unwrap_or_else(|| scope.default_bandwidth())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backoff(&self) -> &BackoffConfig {
        &self.backoff
    }

    pub fn retry_attempts(&self) -> usize {
        self.retry_attempts
    }

    /// An empty registry using these limits.
    pub fn registry(&self) -> BucketRegistry {
        EndpointScope::ALL.into_iter().fold(
            BucketRegistry::new(self.principal_bandwidth),
            |registry, scope| registry.with_endpoint_bandwidth(scope, self.endpoint_bandwidth(scope)),
        )
    }
}

/// Builder for [`GateConfig`]; values are validated in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct GateConfigBuilder {
    principal: (u32, Duration),
    endpoints: Vec<(EndpointScope, u32, Duration)>,
    timeout: Duration,
    backoff: BackoffConfig,
    retry_attempts: usize,
}

impl Default for GateConfigBuilder {
    fn default() -> Self {
        let d = Bandwidth::HELIX_DEFAULT;
        Self {
            principal: (d.capacity(), d.period()),
            endpoints: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            backoff: BackoffConfig::default(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl GateConfigBuilder {
    /// Limit applied to each credential.
    pub fn principal_bandwidth(mut self, capacity: u32, period: Duration) -> Self {
        self.principal = (capacity, period);
        self
    }

    /// Override the documented limit of `scope`.
    pub fn endpoint_bandwidth(mut self, scope: EndpointScope, capacity: u32, period: Duration) -> Self {
        self.endpoints.push((scope, capacity, period));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Total attempts (initial call + retries) for retryable failures.
    pub fn retry_attempts(mut self, attempts: usize) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn build(self) -> Result<GateConfig, ConfigError> {
        let principal_bandwidth = Bandwidth::new(self.principal.0, self.principal.1)?;
        let endpoint_bandwidths = self
            .endpoints
            .into_iter()
            .map(|(scope, capacity, period)| Ok((scope, Bandwidth::new(capacity, period)?)))
            .collect::<Result<HashMap<_, _>, ConfigError>>()?;
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        // Surface an invalid backoff now rather than at first use.
        self.backoff.strategy()?;
        Ok(GateConfig {
            principal_bandwidth,
            endpoint_bandwidths,
            timeout: self.timeout,
            backoff: self.backoff,
            retry_attempts: self.retry_attempts,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBandwidth {
    capacity: u32,
    period_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawBackoff {
    base_ms: u64,
    max_delay_ms: u64,
    max_retries: Option<usize>,
    jitter: bool,
}

impl Default for RawBackoff {
    fn default() -> Self {
        let d = BackoffConfig::default();
        Self {
            base_ms: d.base.as_millis() as u64,
            max_delay_ms: d.max_delay.as_millis() as u64,
            max_retries: d.max_retries,
            jitter: d.jitter,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfig {
    default_bandwidth: Option<RawBandwidth>,
    endpoints: HashMap<String, RawBandwidth>,
    timeout_ms: Option<u64>,
    backoff: RawBackoff,
    retry_attempts: Option<usize>,
}

impl RawConfig {
    fn into_config(self) -> Result<GateConfig, ConfigError> {
        let mut builder = GateConfig::builder().backoff(BackoffConfig {
            base: Duration::from_millis(self.backoff.base_ms),
            max_delay: Duration::from_millis(self.backoff.max_delay_ms),
            max_retries: self.backoff.max_retries,
            jitter: self.backoff.jitter,
        });
        if let Some(bw) = self.default_bandwidth {
            builder = builder.principal_bandwidth(bw.capacity, Duration::from_millis(bw.period_ms));
        }
        for (name, bw) in self.endpoints {
            let scope = EndpointScope::ALL
                .into_iter()
                .find(|s| s.name() == name)
                .ok_or(ConfigError::UnknownEndpoint(name))?;
            builder =
                builder.endpoint_bandwidth(scope, bw.capacity, Duration::from_millis(bw.period_ms));
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(attempts) = self.retry_attempts {
            builder = builder.retry_attempts(attempts);
        }
        builder.build()
    }
}
