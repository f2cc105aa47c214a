//! API error types for the Newscope server.
//!
//! Maps core domain errors to HTTP status codes and JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use newscope_core::error::StorageError;
use serde_json::json;

/// API error type for route handlers.
pub enum ApiError {
    /// Internal storage/database error.
    Storage(StorageError),
    /// Requested resource not found.
    NotFound(String),
    /// Bad request (invalid path or query parameters, etc.).
    BadRequest(String),
    /// Conflict (resource already exists).
    Conflict(String),
    /// The service cannot take the request right now.
    Unavailable(String),
    /// Any other internal failure.
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Storage(StorageError::Contended) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "database is busy, retry shortly".to_string(),
            ),
            Self::Storage(e) => {
                tracing::error!("storage error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = axum::Json(json!({ "error": message }));
        (status, body).into_response()
    }
}
