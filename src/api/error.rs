//! API error types
//!
//! Maps errors to HTTP status codes. Bodies are plain text: the upstream
//! request router only switches on the status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors visible at the HTTP boundary
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or unparsable form value, unsupported format
    #[error("Bad request ({0})")]
    BadRequest(String),

    /// No such metric file
    #[error("Metric not found")]
    NotFound,

    /// A listing was requested before any index walk completed
    #[error("Can't fetch metrics list: file index is empty or disabled")]
    IndexUnavailable,

    /// Response encoder failed
    #[error("An internal error has occured: {0}")]
    Encode(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::IndexUnavailable
            | ApiError::Encode(_)
            | ApiError::Internal(_)
            | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::error!(
            request_id = %request_id,
            status = %status,
            error = %self,
            "request failed"
        );

        (status, self.to_string()).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
