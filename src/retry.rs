//! Retry policy for throttled calls.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial call + retries).
//! - Only errors whose [`ErrorKind`] passes `should_retry` are retried. The default accepts
//!   [`ErrorKind::ServiceUnavailable`] alone, and the default budget is two attempts: a 503 is
//!   retried once and a second 503 is returned to the caller.
//! - When the budget runs out the last error is returned unchanged.
//! - Delays come from a [`Backoff`] curve (first retry uses `delay(1)`), randomized by
//!   [`Jitter`], and are applied through a [`Sleeper`].

use crate::error::{ErrorKind, GateError};
use crate::{Backoff, Jitter, Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

type Predicate = Arc<dyn Fn(ErrorKind) -> bool + Send + Sync>;

/// Retry policy combining attempt budget, backoff, jitter, predicate and sleeper.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Predicate,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("sleeper", &self.sleeper)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicyBuilder::default().assemble()
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or the attempt
    /// budget is spent.
    pub async fn execute<T, E, Fut, Op>(&self, mut operation: Op) -> Result<T, GateError<E>>
    where
        Fut: Future<Output = Result<T, GateError<E>>>,
        Op: FnMut() -> Fut,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !(self.should_retry)(err.kind()) {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                warn!(
                    target: "helix_gate::retry",
                    attempts = attempt,
                    error = %err,
                    "retry budget exhausted; surfacing failure"
                );
                return Err(err);
            }
            let delay = self.jitter.apply(self.backoff.delay(attempt));
            warn!(
                target: "helix_gate::retry",
                attempt,
                max_attempts = self.max_attempts,
                ?delay,
                error = %err,
                "retrying failed call"
            );
            self.sleeper.sleep(delay).await;
        }
    }
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(usize),
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder {
    max_attempts: usize,
    backoff: Backoff,
    jitter: Jitter,
    should_retry: Predicate,
    sleeper: Arc<dyn Sleeper>,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_RETRY_ATTEMPTS,
            backoff: Backoff::exponential(Duration::from_millis(500)),
            jitter: Jitter::Full,
            should_retry: Arc::new(|kind| kind == ErrorKind::ServiceUnavailable),
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

impl RetryPolicyBuilder {
    /// Total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Decide by error kind whether a failure is worth another attempt.
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(ErrorKind) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> Result<RetryPolicy, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        Ok(self.assemble())
    }

    fn assemble(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            jitter: self.jitter,
            should_retry: self.should_retry,
            sleeper: self.sleeper,
        }
    }
}
