//! One parameterized job flow per verification pipeline.
//!
//! Every pipeline follows the same submit → poll → terminal-state shape and
//! differs only in endpoints, identifiers and payload types. A [`JobFlow`]
//! captures exactly those differences; the tracking machinery is shared.

pub mod authenticity;
pub mod claim_research;
pub mod geolocation;
pub mod keys;
pub mod report;
pub mod reverse_lookup;
pub mod trace;

use async_trait::async_trait;
use garde::Validate;
use serde::Serialize;
use std::time::Duration;

use crate::error::ApiError;
use crate::models::job::{Job, JobKind, JobStatus};
use crate::services::api::FetchOutcome;
use crate::services::sse::StepStream;
use crate::tracking::view::ResultSummary;

pub use keys::{JobKey, JobRef, TraceRef, VerificationRef};

/// Cadence used by the dashboard for geolocation and reverse lookup.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Returned by a successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission<K> {
    pub key: K,
    /// Always `queued` or `pending`
    pub status: JobStatus,
    /// Seconds
    pub estimated_time: Option<u64>,
}

impl<K> Submission<K> {
    /// Normalize whatever the backend echoed into one of the two initial states.
    pub fn new(key: K, status: Option<JobStatus>, estimated_time: Option<u64>) -> Self {
        let status = match status {
            Some(JobStatus::Pending) => JobStatus::Pending,
            _ => JobStatus::Queued,
        };
        Self {
            key,
            status,
            estimated_time,
        }
    }
}

/// Endpoints and payload shapes of one asynchronous verification pipeline.
#[async_trait]
pub trait JobFlow: Send + Sync + 'static {
    type Request: Validate<Context = ()> + Serialize + Send + Sync;
    type Key: JobKey;
    type Output: ResultSummary + Clone + Send + Sync + 'static;

    fn kind(&self) -> JobKind;

    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Create the job. Callers validate `request` first; see [`crate::tracking::submit`].
    async fn create(&self, request: &Self::Request) -> Result<Submission<Self::Key>, ApiError>;

    /// Fetch the latest snapshot.
    async fn fetch(&self, key: &Self::Key) -> Result<FetchOutcome<Job<Self::Output>>, ApiError>;

    /// Open a live step stream. `Ok(None)` when the pipeline has none.
    async fn open_stream(&self, _key: &Self::Key) -> Result<Option<StepStream>, ApiError> {
        Ok(None)
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    /// Resumable results location carrying the key in its query string.
    fn results_path(&self, key: &Self::Key) -> String {
        format!("{}?{}", self.kind().results_route(), key.to_query())
    }
}
