use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::flows::{JobFlow, Submission, VerificationRef};
use crate::models::geolocation::{GeolocationRequest, GeolocationResult, LocationVerification};
use crate::models::job::{Job, JobKind, JobStatus, WireProgress};
use crate::services::api::{ApiClient, FetchOutcome};

/// `POST /api/geo/verify`, `GET /api/geo/verify/{id}`
pub struct GeolocationFlow {
    api: Arc<ApiClient>,
}

impl GeolocationFlow {
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
struct GeolocationSnapshot {
    status: JobStatus,
    #[serde(default)]
    verification: Option<LocationVerification>,
    #[serde(default)]
    map_data: Option<serde_json::Value>,
    #[serde(default)]
    claimed_location: Option<String>,
    #[serde(default)]
    media_id: Option<String>,
    #[serde(default)]
    progress: Option<WireProgress>,
    #[serde(default, alias = "message")]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

impl GeolocationSnapshot {
    fn into_job(self, id: &str) -> Job<GeolocationResult> {
        let result = self.verification.map(|verification| GeolocationResult {
            verification,
            map_data: self.map_data,
            claimed_location: self.claimed_location,
            media_id: self.media_id,
        });
        Job::from_parts(
            id,
            JobKind::Geolocation,
            self.status,
            self.progress.map(Into::into),
            result,
            self.error,
        )
        .with_caveats(self.warnings)
    }
}

#[async_trait]
impl JobFlow for GeolocationFlow {
    type Request = GeolocationRequest;
    type Key = VerificationRef;
    type Output = GeolocationResult;

    fn kind(&self) -> JobKind {
        JobKind::Geolocation
    }

    async fn create(&self, request: &GeolocationRequest) -> Result<Submission<VerificationRef>, ApiError> {
        let response: SubmitResponse = self.api.post_json(&["api", "geo", "verify"], request).await?;
        let key = VerificationRef {
            verification_id: response.verification_id,
            media_id: Some(request.media_id.clone()),
        };
        Ok(Submission::new(key, response.status, response.estimated_time))
    }

    async fn fetch(&self, key: &VerificationRef) -> Result<FetchOutcome<Job<GeolocationResult>>, ApiError> {
        let path = ["api", "geo", "verify", key.verification_id.as_str()];
        let outcome = self.api.get_snapshot::<GeolocationSnapshot>(&path).await?;
        Ok(outcome.map(|snapshot| snapshot.into_job(&key.verification_id)))
    }
}
