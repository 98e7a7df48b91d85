//! HTTP error mapping
//!
//! Every error response carries `{"error": <message>}`. Conflicts add
//! `"retryable": true`. Internal failures are logged here with full detail and
//! reported to the client generically.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kinstone_common::{Error, ErrorKind};
use serde_json::json;

/// API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request could not be decoded (400)
    #[error("{0}")]
    BadRequest(String),

    /// Error raised by the fusion core
    #[error(transparent)]
    Domain(#[from] Error),
}

impl ApiError {
    /// Report a missing referenced record as a bad request instead of 404
    ///
    /// Used where the URL itself resolved but a record named in the body did not.
    pub fn missing_as_bad_request(err: Error) -> Self {
        match err {
            Error::NotFound(msg) => ApiError::BadRequest(format!("Not found: {}", msg)),
            other => ApiError::Domain(other),
        }
    }

    /// Domain errors the client may resend unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Domain(err) if err.is_retryable())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(err) => match err.kind() {
                ErrorKind::InvalidInput | ErrorKind::Conflict | ErrorKind::CapacityExceeded => {
                    StatusCode::BAD_REQUEST
                }
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            let body = json!({ "error": "Internal server error" });
            return (status, Json(body)).into_response();
        }

        let body = if self.is_retryable() {
            tracing::debug!(error = %self, "Request lost a race, client may retry");
            json!({ "error": self.to_string(), "retryable": true })
        } else {
            json!({ "error": self.to_string() })
        };

        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
