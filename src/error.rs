//! Error types returned by the gate.
//!
//! [`ApiError`] is what the classifier produces from a completed response. [`GateError`] is
//! what callers of the executor and client see: a classified API failure, the transport's own
//! error passed through untouched, or a timeout.
use crate::rate_limit::BucketError;
use crate::request::ApiResponse;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Placeholder written instead of credential header values.
pub const REDACTED: &str = "<redacted>";

/// Discriminant of every failure the gate can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    ServiceUnavailable,
    Api,
    Transport,
    Timeout,
    CapacityExceeded,
}

/// Request and response details captured when a response is classified as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub request_url: String,
    pub request_method: String,
    /// Header name/value pairs in request order; `Authorization` values are redacted.
    pub request_headers: Vec<(String, String)>,
    pub status: u16,
    /// Response body decoded lossily as UTF-8.
    pub response_body: String,
}

impl ErrorContext {
    /// Snapshot the diagnostic fields of `response`.
    pub fn capture(response: &ApiResponse) -> Self {
        let request = response.request();
        let request_headers = request
            .headers
            .iter()
            .map(|(name, value)| {
                let value = if name == AUTHORIZATION || value.is_sensitive() {
                    REDACTED.to_string()
                } else {
                    String::from_utf8_lossy(value.as_bytes()).into_owned()
                };
                (name.as_str().to_string(), value)
            })
            .collect();
        Self {
            request_url: request.url.to_string(),
            request_method: request.method.to_string(),
            request_headers,
            status: response.status().as_u16(),
            response_body: response.text(),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} returned {}", self.request_method, self.request_url, self.status)
    }
}

/// The structured error document Helix returns on most failures.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelixErrorBody {
    pub error: String,
    pub status: u16,
    #[serde(default)]
    pub message: String,
}

fn describe_body(body: &Option<HelixErrorBody>) -> String {
    match body {
        Some(b) if b.message.is_empty() => format!(" ({})", b.error),
        Some(b) => format!(" ({}: {})", b.error, b.message),
        None => String::new(),
    }
}

/// A failure derived from the status of a completed response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(Box<ErrorContext>),
    #[error("not found: {0}")]
    NotFound(Box<ErrorContext>),
    /// Worth exactly one retry.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(Box<ErrorContext>),
    /// Any other 4xx/5xx. `body` is `None` when the payload was not a Helix error document.
    #[error("helix api error: {context}{}", describe_body(.body))]
    Api { context: Box<ErrorContext>, body: Option<HelixErrorBody> },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Self::Api { .. } => ErrorKind::Api,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Unauthorized(ctx) | Self::NotFound(ctx) | Self::ServiceUnavailable(ctx) => ctx,
            Self::Api { context, .. } => context,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable(_))
    }
}

/// Everything a throttled call can fail with.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GateError<E> {
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The transport failed; the error is exactly what the transport returned.
    #[error("transport error: {0}")]
    Transport(#[source] E),
    /// The caller stopped waiting. Whether the remote side executed the call is unknown.
    #[error("throttled call did not complete within {timeout:?} (waited {elapsed:?})")]
    Timeout { elapsed: Duration, timeout: Duration },
    #[error(transparent)]
    Bucket(#[from] BucketError),
}

impl<E> GateError<E> {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api(e) => e.kind(),
            Self::Transport(_) => ErrorKind::Transport,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Bucket(_) => ErrorKind::CapacityExceeded,
        }
    }

    /// Whether the retry policy should try once more (503 only).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_retryable())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }

    /// Request/response details for classified failures.
    pub fn context(&self) -> Option<&ErrorContext> {
        self.as_api().map(ApiError::context)
    }

    pub fn into_transport(self) -> Option<E> {
        match self {
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }

    pub fn timeout_details(&self) -> Option<(Duration, Duration)> {
        match self {
            Self::Timeout { elapsed, timeout } => Some((*elapsed, *timeout)),
            _ => None,
        }
    }
}
