use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::flows::{JobFlow, JobRef, Submission};
use crate::models::claim_research::{ClaimResearchRequest, ClaimResearchResult, Finding, Source};
use crate::models::job::{Job, JobKind, JobStatus, WireProgress};
use crate::services::api::{ApiClient, FetchOutcome};

/// `POST /api/claim-research`, `GET /api/claim-research/{jobId}`
pub struct ClaimResearchFlow {
    api: Arc<ApiClient>,
}

impl ClaimResearchFlow {
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
struct ResearchSnapshot {
    status: JobStatus,
    #[serde(default)]
    progress: Option<WireProgress>,
    #[serde(default)]
    verdict: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    findings: Vec<Finding>,
    #[serde(default)]
    sources: Vec<Source>,
    #[serde(default, alias = "message")]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[async_trait]
impl JobFlow for ClaimResearchFlow {
    type Request = ClaimResearchRequest;
    type Key = JobRef;
    type Output = ClaimResearchResult;

    fn kind(&self) -> JobKind {
        JobKind::ClaimResearch
    }

    async fn create(&self, request: &ClaimResearchRequest) -> Result<Submission<JobRef>, ApiError> {
        let response: SubmitResponse = self.api.post_json(&["api", "claim-research"], request).await?;
        Ok(Submission::new(
            JobRef::new(response.job_id),
            response.status,
            response.estimated_time,
        ))
    }

    async fn fetch(&self, key: &JobRef) -> Result<FetchOutcome<Job<ClaimResearchResult>>, ApiError> {
        let path = ["api", "claim-research", key.job_id.as_str()];
        let outcome = self.api.get_snapshot::<ResearchSnapshot>(&path).await?;
        Ok(outcome.map(|s| {
            let result = ClaimResearchResult {
                verdict: s.verdict,
                summary: s.summary,
                findings: s.findings,
                sources: s.sources,
            };
            Job::from_parts(
                key.job_id.clone(),
                JobKind::ClaimResearch,
                s.status,
                s.progress.map(Into::into),
                Some(result),
                s.error,
            )
            .with_caveats(s.warnings)
        }))
    }
}
