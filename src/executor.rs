//! Rate-limited execution of outbound calls.
//!
//! [`RateLimitedExecutor`] sits in front of a transport (any
//! `tower::Service<ApiRequest, Response = ApiResponse>`). For each call it:
//!
//! 1. resolves the principal bucket from the bearer token, if the token is known;
//! 2. resolves the endpoint bucket, if the request targets a shared-capacity endpoint;
//! 3. takes one token from each, principal first, waiting on the timer when a bucket is empty;
//! 4. dispatches the call on its own task;
//! 5. waits for the response until the deadline.
//!
//! The timeout is best-effort and covers the caller's wait only. A token wait that has not been
//! granted is abandoned and takes nothing. A call already dispatched is not aborted: it runs to
//! completion in the background and its late outcome is logged. A principal token granted
//! before an endpoint wait timed out stays spent.
//!
//! Requests with no resolvable principal and no endpoint scope are dispatched unthrottled.

use crate::config::DEFAULT_TIMEOUT;
use crate::credential::CredentialResolver;
use crate::error::GateError;
use crate::rate_limit::{BucketRegistry, EndpointScope, RateLimitKey, TokenBucket};
use crate::request::{ApiRequest, ApiResponse};
use futures::future::BoxFuture;
use std::future::{poll_fn, Future};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, error};

/// Longest wait the executor schedules; larger timeouts, up to `Duration::MAX`, mean "no limit".
const MAX_WAIT: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Buckets a request must draw from, in acquisition order.
#[derive(Debug, Clone, Default)]
pub struct Throttle {
    buckets: Vec<(RateLimitKey, Arc<TokenBucket>)>,
}

impl Throttle {
    pub fn is_unthrottled(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RateLimitKey> {
        self.buckets.iter().map(|(key, _)| key)
    }
}

/// Wraps a transport so every call obeys its rate-limit buckets.
pub struct RateLimitedExecutor<S> {
    inner: S,
    registry: Arc<BucketRegistry>,
    resolver: Arc<dyn CredentialResolver>,
    default_timeout: Duration,
}

impl<S: Clone> Clone for RateLimitedExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            registry: self.registry.clone(),
            resolver: self.resolver.clone(),
            default_timeout: self.default_timeout,
        }
    }
}

impl<S> std::fmt::Debug for RateLimitedExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedExecutor")
            .field("registry", &self.registry)
            .field("resolver", &self.resolver)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl<S> RateLimitedExecutor<S> {
    pub fn new(
        inner: S,
        registry: Arc<BucketRegistry>,
        resolver: Arc<dyn CredentialResolver>,
    ) -> Self {
        Self { inner, registry, resolver, default_timeout: DEFAULT_TIMEOUT }
    }

    /// Timeout used by the `Service` implementation.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn registry(&self) -> &Arc<BucketRegistry> {
        &self.registry
    }

    /// Resolve the buckets `request` must draw from: principal first, then endpoint.
    pub fn throttle_for(&self, request: &ApiRequest) -> Throttle {
        let mut buckets = Vec::with_capacity(2);

        match request.bearer_token().and_then(|token| self.resolver.resolve(token)) {
            Some(key) => {
                let bucket = self.registry.get_or_create_bucket(&key);
                buckets.push((key, bucket));
            }
            None => debug!(
                target: "helix_gate::executor",
                url = %request.url(),
                "no rate limit principal for request; not throttling per credential"
            ),
        }

        if let Some(scope) = EndpointScope::for_request(request) {
            match scope.resource_of(request) {
                Some(resource) => {
                    let key = RateLimitKey::endpoint(scope, resource);
                    let bucket = self.registry.get_or_create_bucket(&key);
                    buckets.push((key, bucket));
                }
                None => debug!(
                    target: "helix_gate::executor",
                    scope = scope.name(),
                    url = %request.url(),
                    "endpoint request without resource id; skipping endpoint limit"
                ),
            }
        }

        Throttle { buckets }
    }
}

impl<S> RateLimitedExecutor<S>
where
    S: Service<ApiRequest, Response = ApiResponse> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    /// Throttle and dispatch `request`, waiting at most `timeout` for the response.
    ///
    /// Buckets are resolved when this is called; the returned future does the waiting.
    pub fn execute(
        &self,
        request: ApiRequest,
        timeout: Duration,
    ) -> impl Future<Output = Result<ApiResponse, GateError<S::Error>>> + Send + 'static {
        let throttle = self.throttle_for(&request);
        let inner = self.inner.clone();

        async move {
            let start = Instant::now();
            let deadline = start + timeout.min(MAX_WAIT);
            let timed_out = || GateError::Timeout { elapsed: start.elapsed(), timeout };

            for (index, (key, bucket)) in throttle.buckets.iter().enumerate() {
                if bucket.try_consume(1) {
                    continue;
                }
                debug!(
                    target: "helix_gate::executor",
                    key = %key,
                    wait = ?bucket.time_until_available(1),
                    "bucket empty; scheduling call after refill"
                );
                match tokio::time::timeout_at(deadline, bucket.consume_after_wait(1)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Err(GateError::Bucket(e)),
                    Err(_) => {
                        if index > 0 {
                            debug!(
                                target: "helix_gate::executor",
                                spent = index,
                                "tokens already granted for timed-out call remain spent"
                            );
                        }
                        error!(
                            target: "helix_gate::executor",
                            key = %key,
                            ?timeout,
                            url = %request.url(),
                            "throttled call timed out waiting for a rate limit token"
                        );
                        return Err(timed_out());
                    }
                }
            }

            let url = request.url().clone();
            let (tx, rx) = oneshot::channel();
            let task = tokio::spawn(dispatch(inner, request, tx));

            match tokio::time::timeout_at(deadline, rx).await {
                Ok(Ok(result)) => result.map_err(GateError::Transport),
                Ok(Err(_)) => match task.await {
                    Err(join) if join.is_panic() => std::panic::resume_unwind(join.into_panic()),
                    _ => Err(timed_out()),
                },
                Err(_) => {
                    error!(
                        target: "helix_gate::executor",
                        ?timeout,
                        url = %url,
                        "throttled call timed out before completion; it may still complete remotely"
                    );
                    Err(timed_out())
                }
            }
        }
    }
}

async fn dispatch<S>(
    mut inner: S,
    request: ApiRequest,
    tx: oneshot::Sender<Result<ApiResponse, S::Error>>,
) where
    S: Service<ApiRequest, Response = ApiResponse>,
{
    let url = request.url().clone();
    let result = match poll_fn(|cx| inner.poll_ready(cx)).await {
        Ok(()) => inner.call(request).await,
        Err(e) => Err(e),
    };
    if let Err(late) = tx.send(result) {
        debug!(
            target: "helix_gate::executor",
            url = %url,
            status = late.as_ref().ok().map(|r| r.status().as_u16()),
            succeeded = late.is_ok(),
            "call completed after its caller stopped waiting"
        );
    }
}

impl<S> Service<ApiRequest> for RateLimitedExecutor<S>
where
    S: Service<ApiRequest, Response = ApiResponse> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = ApiResponse;
    type Error = GateError<S::Error>;
    type Future = BoxFuture<'static, Result<ApiResponse, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of the transport is awaited on the dispatched clone.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ApiRequest) -> Self::Future {
        Box::pin(self.execute(request, self.default_timeout))
    }
}

/// Layer producing a [`RateLimitedExecutor`] around a transport.
#[derive(Clone, Debug)]
pub struct RateLimitedLayer {
    registry: Arc<BucketRegistry>,
    resolver: Arc<dyn CredentialResolver>,
    timeout: Duration,
}

impl RateLimitedLayer {
    pub fn new(registry: Arc<BucketRegistry>, resolver: Arc<dyn CredentialResolver>) -> Self {
        Self { registry, resolver, timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<S> Layer<S> for RateLimitedLayer {
    type Service = RateLimitedExecutor<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitedExecutor::new(inner, self.registry.clone(), self.resolver.clone())
            .with_default_timeout(self.timeout)
    }
}
