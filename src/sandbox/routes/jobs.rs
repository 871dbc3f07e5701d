use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::models::job::JobKind;
use crate::sandbox::routes::SandboxError;
use crate::sandbox::{PollReply, SandboxState};

/// Seconds reported back as `estimatedTime` on submission.
const ESTIMATED_SECONDS: u64 = 30;

// ── Geolocation ──────────────────────────────────────────────────

/// POST /api/geo/verify
pub async fn submit_geolocation(
    State(state): State<SandboxState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, SandboxError> {
    require(&body, &["mediaId", "claimedLocation"])?;
    let id = state.create(JobKind::Geolocation, body).await;
    Ok(Json(json!({
        "verificationId": id,
        "status": "queued",
        "estimatedTime": ESTIMATED_SECONDS,
    })))
}

/// GET /api/geo/verify/{id}
pub async fn get_geolocation(
    State(state): State<SandboxState>,
    Path(id): Path<String>,
) -> Result<Response, SandboxError> {
    poll(&state, JobKind::Geolocation, &id).await
}

// ── Reverse lookup ───────────────────────────────────────────────

/// POST /api/reverse-lookup
pub async fn submit_reverse_lookup(
    State(state): State<SandboxState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, SandboxError> {
    require(&body, &["mediaId"])?;
    let id = state.create(JobKind::ReverseLookup, body).await;
    Ok(Json(json!({ "jobId": id })))
}

/// GET /api/reverse-lookup/{id}
pub async fn get_reverse_lookup(
    State(state): State<SandboxState>,
    Path(id): Path<String>,
) -> Result<Response, SandboxError> {
    poll(&state, JobKind::ReverseLookup, &id).await
}

// ── Social media trace ───────────────────────────────────────────

/// POST /api/sm-tracing/media/{media_id}/trace
pub async fn submit_trace(
    State(state): State<SandboxState>,
    Path(media_id): Path<String>,
    Json(mut body): Json<Value>,
) -> Result<Json<Value>, SandboxError> {
    match body.as_object_mut() {
        Some(fields) => {
            fields.insert("mediaId".to_string(), Value::String(media_id));
        }
        None => return Err(SandboxError::BadRequest("Expected a JSON object".to_string())),
    }
    let id = state.create(JobKind::SocialTrace, body).await;
    Ok(Json(json!({ "traceId": id, "status": "pending" })))
}

/// GET /api/sm-tracing/media/{media_id}/trace/{id}
pub async fn get_trace(
    State(state): State<SandboxState>,
    Path((media_id, id)): Path<(String, String)>,
) -> Result<Response, SandboxError> {
    let belongs = state
        .job(&id)
        .await
        .is_some_and(|job| job.input.get("mediaId").and_then(Value::as_str) == Some(media_id.as_str()));
    if !belongs {
        return Err(SandboxError::NotFound);
    }
    poll(&state, JobKind::SocialTrace, &id).await
}

// ── C2PA authenticity ────────────────────────────────────────────

/// POST /api/c2pa/verify
pub async fn submit_authenticity(
    State(state): State<SandboxState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, SandboxError> {
    require(&body, &["mediaId"])?;
    let id = state.create(JobKind::Authenticity, body).await;
    Ok(Json(json!({ "verificationId": id, "status": "queued" })))
}

/// GET /api/c2pa/verify/{id}
pub async fn get_authenticity(
    State(state): State<SandboxState>,
    Path(id): Path<String>,
) -> Result<Response, SandboxError> {
    poll(&state, JobKind::Authenticity, &id).await
}

// ── Claim research ───────────────────────────────────────────────

/// POST /api/claim-research
pub async fn submit_claim_research(
    State(state): State<SandboxState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, SandboxError> {
    require(&body, &["claim"])?;
    let id = state.create(JobKind::ClaimResearch, body).await;
    Ok(Json(json!({ "jobId": id })))
}

/// GET /api/claim-research/{id}
pub async fn get_claim_research(
    State(state): State<SandboxState>,
    Path(id): Path<String>,
) -> Result<Response, SandboxError> {
    poll(&state, JobKind::ClaimResearch, &id).await
}

// ── Reports ──────────────────────────────────────────────────────

/// POST /api/reports
pub async fn submit_report(
    State(state): State<SandboxState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, SandboxError> {
    require(&body, &["title", "mediaIds"])?;
    let id = state.create(JobKind::Report, body).await;
    Ok(Json(json!({ "reportId": id, "status": "queued" })))
}

/// GET /api/reports/{id}
pub async fn get_report(
    State(state): State<SandboxState>,
    Path(id): Path<String>,
) -> Result<Response, SandboxError> {
    poll(&state, JobKind::Report, &id).await
}

// ── Shared ───────────────────────────────────────────────────────

async fn poll(state: &SandboxState, kind: JobKind, id: &str) -> Result<Response, SandboxError> {
    match state.poll(kind, id).await {
        PollReply::NotFound => Err(SandboxError::NotFound),
        PollReply::NotReady => Ok((StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))).into_response()),
        PollReply::Snapshot(snapshot) => Ok(Json(snapshot).into_response()),
    }
}

/// Every field must be a non-blank string or a non-empty array.
fn require(body: &Value, fields: &[&str]) -> Result<(), SandboxError> {
    for field in fields {
        let present = match body.get(*field) {
            Some(Value::String(value)) => !value.trim().is_empty(),
            Some(Value::Array(values)) => !values.is_empty(),
            _ => false,
        };
        if !present {
            return Err(SandboxError::BadRequest(format!("{} is required", field)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_rejects_blank_fields() {
        let body = json!({"mediaId": "m1", "claimedLocation": "  "});
        match require(&body, &["mediaId", "claimedLocation"]) {
            Err(SandboxError::BadRequest(message)) => assert_eq!(message, "claimedLocation is required"),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(require(&json!({"mediaIds": ["m1"], "title": "t"}), &["title", "mediaIds"]).is_ok());
        assert!(require(&json!({"mediaIds": []}), &["mediaIds"]).is_err());
    }
}
