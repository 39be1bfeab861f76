//! Turning completed responses into typed failures.
//!
//! | status        | result                                   |
//! |---------------|------------------------------------------|
//! | 401           | [`ApiError::Unauthorized`]               |
//! | 404           | [`ApiError::NotFound`]                   |
//! | 503           | [`ApiError::ServiceUnavailable`] (retry once) |
//! | other 4xx/5xx | [`ApiError::Api`], with the Helix error body when it parses |
//! | anything else | no error                                 |

use crate::error::{ApiError, ErrorContext, HelixErrorBody};
use crate::request::ApiResponse;
use reqwest::StatusCode;

/// Classify `response`. Pure: reads only the already-buffered response.
pub fn classify(response: &ApiResponse) -> Option<ApiError> {
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return None;
    }

    let context = Box::new(ErrorContext::capture(response));
    let error = match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized(context),
        StatusCode::NOT_FOUND => ApiError::NotFound(context),
        StatusCode::SERVICE_UNAVAILABLE => ApiError::ServiceUnavailable(context),
        _ => {
            let body = serde_json::from_slice::<HelixErrorBody>(response.body()).ok();
            ApiError::Api { context, body }
        }
    };
    Some(error)
}

/// `Ok(response)` unless [`classify`] finds a failure.
pub fn check(response: ApiResponse) -> Result<ApiResponse, ApiError> {
    match classify(&response) {
        Some(err) => Err(err),
        None => Ok(response),
    }
}
