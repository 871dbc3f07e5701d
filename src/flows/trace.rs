use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::flows::{JobFlow, Submission, TraceRef};
use crate::models::job::{Job, JobKind, JobStatus, WireProgress};
use crate::models::trace::{PlatformAppearance, TraceRequest, TraceResult};
use crate::services::api::{ApiClient, FetchOutcome};

/// `POST /api/sm-tracing/media/{mediaId}/trace`,
/// `GET /api/sm-tracing/media/{mediaId}/trace/{traceId}`
pub struct TraceFlow {
    api: Arc<ApiClient>,
}

impl TraceFlow {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    trace_id: String,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    estimated_time: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TraceSnapshot {
    status: JobStatus,
    #[serde(default)]
    progress: Option<WireProgress>,
    #[serde(default)]
    platform_appearances: Vec<PlatformAppearance>,
    #[serde(default)]
    distribution_graph: Option<serde_json::Value>,
    #[serde(default)]
    forensic_analysis: Option<serde_json::Value>,
    #[serde(default, alias = "message")]
    error: Option<String>,
    /// Platforms the crawler could not reach
    #[serde(default)]
    unavailable_platforms: Vec<String>,
}

impl TraceSnapshot {
    fn into_job(self, key: &TraceRef) -> Job<TraceResult> {
        let caveats = self
            .unavailable_platforms
            .iter()
            .map(|platform| format!("{} was unavailable during the trace", platform))
            .collect();
        Job::from_parts(
            key.trace_id.clone(),
            JobKind::SocialTrace,
            self.status,
            self.progress.map(Into::into),
            Some(TraceResult {
                platform_appearances: self.platform_appearances,
                distribution_graph: self.distribution_graph,
                forensic_analysis: self.forensic_analysis,
            }),
            self.error,
        )
        .with_caveats(caveats)
    }
}

#[async_trait]
impl JobFlow for TraceFlow {
    type Request = TraceRequest;
    type Key = TraceRef;
    type Output = TraceResult;

    fn kind(&self) -> JobKind {
        JobKind::SocialTrace
    }

    async fn create(&self, request: &TraceRequest) -> Result<Submission<TraceRef>, ApiError> {
        let path = ["api", "sm-tracing", "media", request.media_id.as_str(), "trace"];
        let response: SubmitResponse = self.api.post_json(&path, request).await?;
        let key = TraceRef {
            media_id: request.media_id.clone(),
            trace_id: response.trace_id,
        };
        Ok(Submission::new(key, response.status, response.estimated_time))
    }

    async fn fetch(&self, key: &TraceRef) -> Result<FetchOutcome<Job<TraceResult>>, ApiError> {
        let path = [
            "api",
            "sm-tracing",
            "media",
            key.media_id.as_str(),
            "trace",
            key.trace_id.as_str(),
        ];
        let outcome = self.api.get_snapshot::<TraceSnapshot>(&path).await?;
        Ok(outcome.map(|snapshot| snapshot.into_job(key)))
    }
}
