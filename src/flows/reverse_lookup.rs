use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::flows::{JobFlow, JobRef, Submission};
use crate::models::job::{Job, JobKind, JobStatus, WireProgress};
use crate::models::reverse_lookup::{LookupMatch, ReverseLookupRequest, ReverseLookupResult};
use crate::services::api::{ApiClient, FetchOutcome};

/// `POST /api/reverse-lookup`, `GET /api/reverse-lookup/{jobId}`
pub struct ReverseLookupFlow {
    api: Arc<ApiClient>,
}

impl ReverseLookupFlow {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    job_id: String,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    estimated_time: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupSnapshot {
    status: JobStatus,
    #[serde(default)]
    results: Vec<LookupMatch>,
    #[serde(default)]
    progress: Option<WireProgress>,
    #[serde(default, alias = "message")]
    error: Option<String>,
    /// Engines that could not be queried; their absence makes a result partial.
    #[serde(default)]
    failed_engines: Vec<String>,
}

impl LookupSnapshot {
    fn into_job(self, id: &str) -> Job<ReverseLookupResult> {
        let caveats = self
            .failed_engines
            .iter()
            .map(|engine| format!("{} could not be searched", engine))
            .collect();
        Job::from_parts(
            id,
            JobKind::ReverseLookup,
            self.status,
            self.progress.map(Into::into),
            Some(ReverseLookupResult {
                matches: self.results,
            }),
            self.error,
        )
        .with_caveats(caveats)
    }
}

#[async_trait]
impl JobFlow for ReverseLookupFlow {
    type Request = ReverseLookupRequest;
    type Key = JobRef;
    type Output = ReverseLookupResult;

    fn kind(&self) -> JobKind {
        JobKind::ReverseLookup
    }

    async fn create(&self, request: &ReverseLookupRequest) -> Result<Submission<JobRef>, ApiError> {
        let response: SubmitResponse = self.api.post_json(&["api", "reverse-lookup"], request).await?;
        Ok(Submission::new(
            JobRef::new(response.job_id),
            response.status,
            response.estimated_time,
        ))
    }

    async fn fetch(&self, key: &JobRef) -> Result<FetchOutcome<Job<ReverseLookupResult>>, ApiError> {
        let path = ["api", "reverse-lookup", key.job_id.as_str()];
        let outcome = self.api.get_snapshot::<LookupSnapshot>(&path).await?;
        Ok(outcome.map(|snapshot| snapshot.into_job(&key.job_id)))
    }
}
