//! The throttled Helix client.
//!
//! [`HelixClient`] composes the pieces of the gate in the order a call sees them:
//! retry policy, then rate-limited execution, then response classification. A 503 is retried
//! once by default, and each attempt goes back through the buckets.

use crate::backoff::{BackoffError, ExponentialBackoffStrategy};
use crate::classify::check;
use crate::config::GateConfig;
use crate::credential::CredentialResolver;
use crate::error::GateError;
use crate::executor::RateLimitedExecutor;
use crate::rate_limit::BucketRegistry;
use crate::request::{ApiRequest, ApiResponse};
use crate::retry::RetryPolicy;
use crate::transport::ReqwestTransport;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tower_service::Service;

#[derive(Debug, Clone)]
pub struct HelixClient<S> {
    executor: RateLimitedExecutor<S>,
    retry: RetryPolicy,
    config: GateConfig,
}

impl HelixClient<ReqwestTransport> {
    /// A client sending over a default `reqwest` client.
    pub fn with_reqwest(config: GateConfig, resolver: Arc<dyn CredentialResolver>) -> Self {
        Self::new(config, resolver, ReqwestTransport::default())
    }
}

impl<S> HelixClient<S> {
    pub fn new(config: GateConfig, resolver: Arc<dyn CredentialResolver>, transport: S) -> Self {
        let registry = Arc::new(config.registry());
        let executor = RateLimitedExecutor::new(transport, registry, resolver)
            .with_default_timeout(config.timeout());
        let mut retry = RetryPolicy::builder()
            .max_attempts(config.retry_attempts())
            .with_jitter(config.backoff().jitter());
        // `GateConfig` validated both the curve and the attempt count.
        if let Ok(curve) = config.backoff().curve() {
            retry = retry.backoff(curve);
        }
        let retry = retry.build().unwrap_or_default();
        Self { executor, retry, config }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Replace the retry policy derived from the configuration.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn executor(&self) -> &RateLimitedExecutor<S> {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<BucketRegistry> {
        self.executor.registry()
    }

    /// A fresh stateful backoff for retry sites outside the request path, such as reconnect
    /// loops.
    pub fn backoff(&self) -> Result<ExponentialBackoffStrategy, BackoffError> {
        self.config.backoff().strategy()
    }
}

impl<S> HelixClient<S>
where
    S: Service<ApiRequest, Response = ApiResponse> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Display + Send + 'static,
{
    /// Send `request` with the configured timeout.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GateError<S::Error>> {
        self.send_with_timeout(request, self.config.timeout()).await
    }

    /// Send `request`, bounding each attempt's wait by `timeout`.
    ///
    /// Successful responses are returned as-is. 4xx and 5xx responses become
    /// [`GateError::Api`].
    pub async fn send_with_timeout(
        &self,
        request: ApiRequest,
        timeout: Duration,
    ) -> Result<ApiResponse, GateError<S::Error>> {
        self.retry
            .execute(|| {
                let call = self.executor.execute(request.clone(), timeout);
                async move { call.await.and_then(|response| check(response).map_err(GateError::Api)) }
            })
            .await
    }
}
