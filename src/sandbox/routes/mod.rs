pub mod auth;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod stream;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error responses in the backend's `{"message": ...}` shape.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Job not found")]
    NotFound,

    #[error("Session expired")]
    Unauthorized,
}

impl IntoResponse for SandboxError {
    fn into_response(self) -> Response {
        let status = match self {
            SandboxError::BadRequest(_) => StatusCode::BAD_REQUEST,
            SandboxError::NotFound => StatusCode::NOT_FOUND,
            SandboxError::Unauthorized => StatusCode::UNAUTHORIZED,
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}
