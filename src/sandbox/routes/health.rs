use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::sandbox::SandboxState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub job_store: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
    pub jobs: usize,
}

/// GET /health: liveness plus a job store probe.
pub async fn health_check(State(state): State<SandboxState>) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let jobs = state.job_count().await;

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            job_store: ComponentHealth {
                status: "ok".to_string(),
                latency_ms: Some(start.elapsed().as_millis() as u64),
                jobs,
            },
        },
    };

    (StatusCode::OK, Json(response))
}
