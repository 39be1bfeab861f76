//! Convenient re-exports for common helix-gate types.
pub use crate::{
    backoff::{Backoff, BackoffError, BackoffStrategy, ExponentialBackoffStrategy, MAX_BACKOFF},
    config::{BackoffConfig, GateConfig, DEFAULT_TIMEOUT},
    credential::{Credential, CredentialResolver, TokenCache},
    error::{ApiError, ErrorKind, GateError},
    executor::{RateLimitedExecutor, RateLimitedLayer},
    jitter::Jitter,
    rate_limit::{Bandwidth, EndpointScope, RateLimitKey},
    request::{ApiRequest, ApiResponse},
    retry::{BuildError, RetryPolicy},
    HelixClient,
};
