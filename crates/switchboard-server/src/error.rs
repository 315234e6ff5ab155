//! Error types for the bridge.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use switchboard_host::HostError;

/// Bridge error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Authentication failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Host operation failure.
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found".to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request".to_string()),
            ServerError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error".to_string())
            }
            ServerError::Host(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.code().as_str().to_lowercase(),
            ),
            ServerError::Serialization(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "serialization_error".to_string(),
            ),
        };

        let message = self.to_string();

        match &self {
            ServerError::Internal(_) | ServerError::Host(_) | ServerError::Serialization(_) => {
                tracing::error!(status = %status, code = %code, error = %message, "Server error");
            }
            _ => {
                tracing::warn!(status = %status, code = %code, error = %message, "Client error");
            }
        }

        let body = ErrorResponse { code, message };

        (status, Json(body)).into_response()
    }
}
