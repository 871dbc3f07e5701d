use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::sandbox::routes::SandboxError;
use crate::sandbox::SandboxState;

pub const SESSION_COOKIE: &str = "sgm_session";

/// POST /api/auth/refresh: issue a fresh session cookie.
pub async fn refresh(State(state): State<SandboxState>) -> impl IntoResponse {
    let token = state.start_session().await;
    tracing::info!("Issued sandbox session");
    (
        [(SET_COOKIE, format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, token))],
        Json(json!({ "refreshed": true })),
    )
}

/// Reject job routes without a live session when sessions are required.
pub async fn require_session(
    State(state): State<SandboxState>,
    request: Request,
    next: Next,
) -> Result<Response, SandboxError> {
    if !state.config.require_session {
        return Ok(next.run(request).await);
    }

    let authorized = match session_token(request.headers()) {
        Some(token) => state.has_session(&token).await,
        None => false,
    };
    if !authorized {
        tracing::debug!(path = %request.uri().path(), "Rejecting request without session");
        return Err(SandboxError::Unauthorized);
    }
    Ok(next.run(request).await)
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}
