/// Unified error types for the media service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the media service
#[derive(Error, Debug)]
pub enum MediaError {
    /// Client input was malformed (empty upload, missing file part)
    #[error("Validation error: {0}")]
    Validation(String),

    /// No blob matches the requested id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request body exceeded the configured upload limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Disk I/O failed on write, read, or delete
    #[error("Storage error: {0}")]
    Storage(String),

    /// Storage root could not be prepared; the process must not serve
    #[error("Startup failure: {0}")]
    Startup(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            MediaError::Validation(_) => "validation",
            MediaError::NotFound(_) => "not_found",
            MediaError::PayloadTooLarge(_) => "payload_too_large",
            MediaError::Storage(_) => "storage",
            MediaError::Startup(_) => "startup",
            MediaError::Config(_) => "config",
            MediaError::Internal(_) => "internal",
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Convert MediaError to HTTP response
impl IntoResponse for MediaError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            MediaError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "InvalidRequest",
                self.to_string(),
            ),
            MediaError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NotFound",
                self.to_string(),
            ),
            MediaError::PayloadTooLarge(_) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PayloadTooLarge",
                self.to_string(),
            ),
            MediaError::Storage(_)
            | MediaError::Startup(_)
            | MediaError::Config(_)
            | MediaError::Internal(_) => {
                tracing::error!(error = %self, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalServerError",
                    "Internal server error".to_string(), // Don't leak details
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for media service operations
pub type MediaResult<T> = Result<T, MediaError>;
