use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::flows::{JobFlow, Submission, VerificationRef};
use crate::models::authenticity::{AuthenticityRequest, AuthenticityResult};
use crate::models::job::{Job, JobKind, JobStatus, WireProgress};
use crate::services::api::{ApiClient, FetchOutcome};
use crate::services::sse::{self, StepStream};

/// C2PA verification: `POST /api/c2pa/verify`, `GET /api/c2pa/verify/{id}`,
/// live steps on `GET /api/c2pa/verify/{id}/stream`.
pub struct AuthenticityFlow {
    api: Arc<ApiClient>,
}

impl AuthenticityFlow {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    verification_id: String,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    estimated_time: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthenticitySnapshot {
    status: JobStatus,
    #[serde(default)]
    result: Option<AuthenticityResult>,
    #[serde(default)]
    progress: Option<WireProgress>,
    #[serde(default, alias = "message")]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[async_trait]
impl JobFlow for AuthenticityFlow {
    type Request = AuthenticityRequest;
    type Key = VerificationRef;
    type Output = AuthenticityResult;

    fn kind(&self) -> JobKind {
        JobKind::Authenticity
    }

    async fn create(&self, request: &AuthenticityRequest) -> Result<Submission<VerificationRef>, ApiError> {
        let response: SubmitResponse = self.api.post_json(&["api", "c2pa", "verify"], request).await?;
        let key = VerificationRef {
            verification_id: response.verification_id,
            media_id: Some(request.media_id.clone()),
        };
        Ok(Submission::new(key, response.status, response.estimated_time))
    }

    async fn fetch(&self, key: &VerificationRef) -> Result<FetchOutcome<Job<AuthenticityResult>>, ApiError> {
        let path = ["api", "c2pa", "verify", key.verification_id.as_str()];
        let outcome = self.api.get_snapshot::<AuthenticitySnapshot>(&path).await?;
        Ok(outcome.map(|snapshot| {
            Job::from_parts(
                key.verification_id.clone(),
                JobKind::Authenticity,
                snapshot.status,
                snapshot.progress.map(Into::into),
                snapshot.result,
                snapshot.error,
            )
            .with_caveats(snapshot.warnings)
        }))
    }

    async fn open_stream(&self, key: &VerificationRef) -> Result<Option<StepStream>, ApiError> {
        let path = ["api", "c2pa", "verify", key.verification_id.as_str(), "stream"];
        let response = self.api.open_event_stream(&path).await?;
        Ok(Some(sse::step_events(response)))
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}
