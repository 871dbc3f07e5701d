use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Verification pipelines that run as asynchronous backend jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum JobKind {
    Authenticity,
    Geolocation,
    ReverseLookup,
    SocialTrace,
    ClaimResearch,
    Report,
}

impl JobKind {
    pub fn label(self) -> &'static str {
        match self {
            JobKind::Authenticity => "Authenticity check",
            JobKind::Geolocation => "Geolocation verification",
            JobKind::ReverseLookup => "Reverse image lookup",
            JobKind::SocialTrace => "Social media trace",
            JobKind::ClaimResearch => "Claim research",
            JobKind::Report => "Report generation",
        }
    }

    /// Label of the "start over" action on a finished view.
    pub fn start_new_label(self) -> &'static str {
        match self {
            JobKind::Authenticity => "Start New Check",
            JobKind::Geolocation => "Start New Verification",
            JobKind::ReverseLookup => "Start New Lookup",
            JobKind::SocialTrace => "Start New Trace",
            JobKind::ClaimResearch => "Start New Research",
            JobKind::Report => "Generate New Report",
        }
    }

    /// Shown when a job fails without a backend message.
    pub fn failure_fallback(self) -> &'static str {
        match self {
            JobKind::Authenticity => "The authenticity check could not be completed.",
            JobKind::Geolocation => "The location could not be verified.",
            JobKind::ReverseLookup => "The reverse lookup could not be completed.",
            JobKind::SocialTrace => "The social media trace could not be completed.",
            JobKind::ClaimResearch => "The claim could not be researched.",
            JobKind::Report => "The report could not be generated.",
        }
    }

    /// Dashboard route of the resumable results view.
    pub fn results_route(self) -> &'static str {
        match self {
            JobKind::Authenticity => "/dashboard/authenticity/results",
            JobKind::Geolocation => "/dashboard/geolocation/results",
            JobKind::ReverseLookup => "/dashboard/reverse-lookup/results",
            JobKind::SocialTrace => "/dashboard/trace/results",
            JobKind::ClaimResearch => "/dashboard/claim-research/results",
            JobKind::Report => "/dashboard/reports",
        }
    }
}

/// Server-reported job status.
///
/// Unrecognised values deserialize to `Unknown`, which counts as in-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Pending,
    Processing,
    Searching,
    Analyzing,
    #[serde(alias = "complete")]
    Completed,
    Partial,
    Failed,
    #[serde(alias = "no-results")]
    NoResults,
    #[serde(other)]
    Unknown,
}

/// Coarse grouping used to gate streaming, staleness and reconnect refetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoarseStatus {
    Queued,
    Processing,
    Terminal,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Failed | JobStatus::NoResults
        )
    }

    /// `completed` or `partial`: the only statuses that carry a result.
    pub fn is_success(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Partial)
    }

    pub fn coarse(self) -> CoarseStatus {
        match self {
            JobStatus::Queued | JobStatus::Pending => CoarseStatus::Queued,
            JobStatus::Processing
            | JobStatus::Searching
            | JobStatus::Analyzing
            | JobStatus::Unknown => CoarseStatus::Processing,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Failed | JobStatus::NoResults => {
                CoarseStatus::Terminal
            }
        }
    }
}

/// Mid-flight progress information.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    #[serde(default)]
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
}

impl Progress {
    pub fn clamped(mut self) -> Self {
        self.percentage = if self.percentage.is_nan() {
            0.0
        } else {
            self.percentage.clamp(0.0, 100.0)
        };
        self
    }
}

/// Progress as it appears on the wire: either a bare percentage or an object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireProgress {
    Percent(f64),
    Detailed(Progress),
}

impl From<WireProgress> for Progress {
    fn from(wire: WireProgress) -> Self {
        match wire {
            WireProgress::Percent(percentage) => Progress {
                percentage,
                ..Progress::default()
            },
            WireProgress::Detailed(progress) => progress,
        }
        .clamped()
    }
}

/// One asynchronous verification request, as last reported by the backend.
///
/// `result` is only ever present for `completed`/`partial` and `error` only
/// for `failed`; both are empty while the job is in flight. Once terminal, a
/// job refuses further snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job<R> {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress: Option<Progress>,
    pub submitted_at: DateTime<Utc>,
    result: Option<R>,
    error: Option<String>,
    /// Missing-data flags and warnings that accompany a partial result.
    pub caveats: Vec<String>,
}

impl<R> Job<R> {
    /// The state set synchronously after a successful submission.
    pub fn queued(id: impl Into<String>, kind: JobKind) -> Self {
        Self {
            id: id.into(),
            kind,
            status: JobStatus::Queued,
            progress: None,
            submitted_at: Utc::now(),
            result: None,
            error: None,
            caveats: Vec::new(),
        }
    }

    /// Build a snapshot, discarding fields that contradict `status`.
    pub fn from_parts(
        id: impl Into<String>,
        kind: JobKind,
        status: JobStatus,
        progress: Option<Progress>,
        result: Option<R>,
        error: Option<String>,
    ) -> Self {
        let result = if status.is_success() { result } else { None };
        let error = if status == JobStatus::Failed {
            error.filter(|message| !message.trim().is_empty())
        } else {
            None
        };
        let progress = if status.is_terminal() {
            None
        } else {
            progress.map(Progress::clamped)
        };

        Self {
            id: id.into(),
            kind,
            status,
            progress,
            submitted_at: Utc::now(),
            result,
            error,
            caveats: Vec::new(),
        }
    }

    pub fn with_caveats(mut self, caveats: Vec<String>) -> Self {
        self.caveats = caveats;
        self
    }

    pub fn with_submitted_at(mut self, submitted_at: DateTime<Utc>) -> Self {
        self.submitted_at = submitted_at;
        self
    }

    pub fn result(&self) -> Option<&R> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a newer snapshot. Returns `false` (and keeps `self`) once terminal.
    pub fn absorb(&mut self, next: Job<R>) -> bool {
        if self.is_terminal() {
            return false;
        }
        let submitted_at = self.submitted_at.min(next.submitted_at);
        *self = next;
        self.submitted_at = submitted_at;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        let status: JobStatus = serde_json::from_str("\"no_results\"").unwrap();
        assert_eq!(status, JobStatus::NoResults);

        let status: JobStatus = serde_json::from_str("\"complete\"").unwrap();
        assert_eq!(status, JobStatus::Completed);

        let status: JobStatus = serde_json::from_str("\"crawling\"").unwrap();
        assert_eq!(status, JobStatus::Unknown);
        assert_eq!(status.coarse(), CoarseStatus::Processing);
    }

    #[test]
    fn test_terminal_statuses() {
        let terminal: Vec<JobStatus> = [
            JobStatus::Queued,
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Searching,
            JobStatus::Analyzing,
            JobStatus::Completed,
            JobStatus::Partial,
            JobStatus::Failed,
            JobStatus::NoResults,
        ]
        .into_iter()
        .filter(|s| s.is_terminal())
        .collect();
        assert_eq!(
            terminal,
            vec![
                JobStatus::Completed,
                JobStatus::Partial,
                JobStatus::Failed,
                JobStatus::NoResults
            ]
        );
    }

    #[test]
    fn test_kind_round_trips_through_strum() {
        assert_eq!(JobKind::ReverseLookup.to_string(), "reverse-lookup");
        assert_eq!("social-trace".parse::<JobKind>().unwrap(), JobKind::SocialTrace);
    }

    #[test]
    fn test_from_parts_drops_contradicting_fields() {
        let job: Job<u32> = Job::from_parts(
            "j1",
            JobKind::Geolocation,
            JobStatus::Processing,
            Some(Progress {
                percentage: 140.0,
                ..Progress::default()
            }),
            Some(7),
            Some("boom".to_string()),
        );
        assert!(job.result().is_none());
        assert!(job.error().is_none());
        assert_eq!(job.progress.unwrap().percentage, 100.0);

        let failed: Job<u32> = Job::from_parts(
            "j1",
            JobKind::Geolocation,
            JobStatus::Failed,
            None,
            Some(7),
            Some("Geocoder unavailable".to_string()),
        );
        assert!(failed.result().is_none());
        assert_eq!(failed.error(), Some("Geocoder unavailable"));
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let mut job: Job<u32> = Job::queued("j1", JobKind::ReverseLookup);
        let done = Job::from_parts("j1", JobKind::ReverseLookup, JobStatus::Completed, None, Some(3), None);
        assert!(job.absorb(done));
        assert_eq!(job.result(), Some(&3));

        let revived = Job::from_parts("j1", JobKind::ReverseLookup, JobStatus::Processing, None, None, None);
        assert!(!job.absorb(revived));
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result(), Some(&3));
    }

    #[test]
    fn test_wire_progress_accepts_number_or_object() {
        let bare: WireProgress = serde_json::from_str("45").unwrap();
        assert_eq!(Progress::from(bare).percentage, 45.0);

        let detailed: WireProgress =
            serde_json::from_str(r#"{"percentage": 60, "stage": "matching", "estimatedTimeRemaining": 30}"#)
                .unwrap();
        let progress = Progress::from(detailed);
        assert_eq!(progress.stage.as_deref(), Some("matching"));
        assert_eq!(progress.estimated_time_remaining, Some(30));
    }
}
