use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ApiError;
use crate::flows::{JobFlow, JobRef, Submission};
use crate::models::job::{Job, JobKind, JobStatus, WireProgress};
use crate::models::report::{ReportRequest, ReportResult};
use crate::services::api::{ApiClient, FetchOutcome};

/// Report generation is quicker than verification; poll faster.
const REPORT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// `POST /api/reports`, `GET /api/reports/{id}`
pub struct ReportFlow {
    api: Arc<ApiClient>,
}

impl ReportFlow {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    #[serde(alias = "id")]
    report_id: String,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    estimated_time: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportSnapshot {
    status: JobStatus,
    #[serde(default)]
    progress: Option<WireProgress>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default, alias = "message")]
    error: Option<String>,
}

#[async_trait]
impl JobFlow for ReportFlow {
    type Request = ReportRequest;
    type Key = JobRef;
    type Output = ReportResult;

    fn kind(&self) -> JobKind {
        JobKind::Report
    }

    fn poll_interval(&self) -> Duration {
        REPORT_POLL_INTERVAL
    }

    async fn create(&self, request: &ReportRequest) -> Result<Submission<JobRef>, ApiError> {
        let response: SubmitResponse = self.api.post_json(&["api", "reports"], request).await?;
        Ok(Submission::new(
            JobRef::new(response.report_id),
            response.status,
            response.estimated_time,
        ))
    }

    async fn fetch(&self, key: &JobRef) -> Result<FetchOutcome<Job<ReportResult>>, ApiError> {
        let path = ["api", "reports", key.job_id.as_str()];
        let outcome = self.api.get_snapshot::<ReportSnapshot>(&path).await?;
        Ok(outcome.map(|s| {
            Job::from_parts(
                key.job_id.clone(),
                JobKind::Report,
                s.status,
                s.progress.map(Into::into),
                Some(ReportResult {
                    download_url: s.download_url,
                }),
                s.error,
            )
        }))
    }
}
