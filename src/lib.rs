#![forbid(unsafe_code)]

//! # helix-gate
//!
//! Throttled execution of Twitch Helix API calls.
//!
//! Helix meters each credential with a token bucket (800 points per minute by default) and
//! meters some endpoints separately per target resource, such as ban and unban requests per
//! broadcaster. This crate mirrors those limits locally so callers wait for capacity instead
//! of collecting `429 Too Many Requests`.
//!
//! ## Features
//!
//! - **Token buckets**: lock-free GCRA buckets with exact integer refill
//! - **Bucket registry**: one bucket per principal and per (endpoint, resource), created on demand
//! - **Rate-limited executor**: waits on the timer for tokens, then dispatches, bounded by a timeout
//! - **Error classification**: 401, 404 and 503 get their own variants; other failures keep the
//!   Helix error body
//! - **Retry and backoff**: a single retry for 503 and a stateful exponential backoff with jitter
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use helix_gate::{ApiRequest, Credential, GateConfig, HelixClient, TokenCache};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tokens = Arc::new(TokenCache::new());
//!     tokens.insert(Credential::new("access-token").with_client_id("cid").with_user_id("42"));
//!
//!     let client = HelixClient::with_reqwest(GateConfig::default(), tokens);
//!     let request = ApiRequest::get("https://api.twitch.tv/helix/users".parse()?)
//!         .with_bearer_token("access-token")?;
//!
//!     let response = client.send(request).await?;
//!     println!("{}", response.text());
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod classify;
pub mod client;
pub mod clock;
pub mod config;
pub mod credential;
pub mod error;
pub mod executor;
pub mod jitter;
pub mod prelude;
pub mod rate_limit;
pub mod request;
pub mod retry;
pub mod sleeper;
pub mod transport;

// Re-exports
pub use backoff::{Backoff, BackoffStrategy, ExponentialBackoffStrategy};
pub use classify::{check, classify};
pub use client::HelixClient;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{BackoffConfig, ConfigError, GateConfig};
pub use credential::{Credential, CredentialResolver, TokenCache};
pub use error::{ApiError, ErrorContext, ErrorKind, GateError};
pub use executor::{RateLimitedExecutor, RateLimitedLayer};
pub use jitter::Jitter;
pub use rate_limit::{Bandwidth, BucketError, BucketRegistry, EndpointScope, RateLimitKey, TokenBucket};
pub use request::{ApiRequest, ApiResponse};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{RecordingSleeper, Sleeper, TokioSleeper};
pub use transport::ReqwestTransport;
