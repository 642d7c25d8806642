//! Error types for the HTTP server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dc_cache::CacheError;
use serde_json::json;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ServerError {
    /// No page matches the requested path.
    #[error("Page not found: {0}")]
    PageNotFound(String),

    /// The store failed to produce a page.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// The request body could not be decoded.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::PageNotFound(path) => (
                StatusCode::NOT_FOUND,
                json!({"error": "Page not found", "path": path}),
            ),
            Self::Cache(e) if e.is_not_found() => (
                StatusCode::NOT_FOUND,
                json!({"error": "Page not found", "detail": e.to_string()}),
            ),
            Self::Cache(e) => {
                tracing::error!(error = %e, "Failed to produce page");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": e.to_string()}),
                )
            }
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({"error": "Bad request", "detail": message}),
            ),
            Self::Io(e) => {
                tracing::error!(error = %e, "I/O failure while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": e.to_string()}),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}
