use crate::models::job::{Job, JobKind, JobStatus, Progress};
use crate::tracking::poller::{PollPhase, PollState};

/// Human-readable summary of a finished job's result.
pub trait ResultSummary {
    fn headline(&self) -> String;

    fn details(&self) -> Vec<String> {
        Vec::new()
    }
}

/// The one view a job is in at any moment.
///
/// `Starting`, `NotFound` and `Error` come from the poll session (warm-up,
/// an exhausted not-found budget, a fetch that cannot be retried on a
/// timer); the other variants are a total mapping of the job status.
#[derive(Debug, Clone, PartialEq)]
pub enum JobView<R> {
    Starting,
    InProgress {
        status: JobStatus,
        progress: Option<Progress>,
    },
    Failed {
        message: String,
    },
    NoResults,
    Results {
        result: R,
        partial: bool,
        caveats: Vec<String>,
    },
    NotFound,
    /// Polling stopped after a hard fetch failure; the job itself may still be running.
    Error {
        message: String,
    },
}

/// Actions offered alongside a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    Refresh,
    StartNew,
    Retry,
    BackToList,
}

impl ViewAction {
    pub fn label(self, kind: JobKind) -> String {
        match self {
            ViewAction::Refresh => "Refresh".to_string(),
            ViewAction::StartNew => kind.start_new_label().to_string(),
            ViewAction::Retry => "Retry".to_string(),
            ViewAction::BackToList => "Back to List".to_string(),
        }
    }
}

impl<R: Clone> JobView<R> {
    pub fn from_status(
        kind: JobKind,
        status: JobStatus,
        result: Option<&R>,
        error: Option<&str>,
        caveats: &[String],
    ) -> Self {
        match status {
            JobStatus::Queued
            | JobStatus::Pending
            | JobStatus::Processing
            | JobStatus::Searching
            | JobStatus::Analyzing
            | JobStatus::Unknown => JobView::InProgress {
                status,
                progress: None,
            },
            JobStatus::Completed | JobStatus::Partial => match result {
                Some(result) => JobView::Results {
                    result: result.clone(),
                    partial: status == JobStatus::Partial,
                    caveats: caveats.to_vec(),
                },
                // A success without a payload has nothing to show.
                None => JobView::NoResults,
            },
            JobStatus::NoResults => JobView::NoResults,
            JobStatus::Failed => JobView::Failed {
                message: error
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or(kind.failure_fallback())
                    .to_string(),
            },
        }
    }

    pub fn from_job(job: &Job<R>) -> Self {
        let mut view = Self::from_status(job.kind, job.status, job.result(), job.error(), &job.caveats);
        if let JobView::InProgress { progress, .. } = &mut view {
            *progress = job.progress.clone();
        }
        view
    }

    pub fn from_poll(state: &PollState<R>) -> Self {
        match (&state.data, state.phase) {
            (Some(job), _) if job.is_terminal() => Self::from_job(job),
            (_, PollPhase::NotFound) => JobView::NotFound,
            (_, PollPhase::Error) => JobView::Error {
                message: state
                    .last_error
                    .clone()
                    .unwrap_or_else(|| crate::error::GENERIC_FAILURE_MESSAGE.to_string()),
            },
            (Some(job), PollPhase::Starting | PollPhase::Tracking) => Self::from_job(job),
            (None, PollPhase::Starting | PollPhase::Tracking) => JobView::Starting,
        }
    }
}

impl<R> JobView<R> {
    pub fn name(&self) -> &'static str {
        match self {
            JobView::Starting => "starting",
            JobView::InProgress { .. } => "in-progress",
            JobView::Failed { .. } => "failed",
            JobView::NoResults => "no-results",
            JobView::Results { .. } => "results",
            JobView::NotFound => "not-found",
            JobView::Error { .. } => "error",
        }
    }

    /// The job itself has finished; `NotFound` and `Error` are excluded since a manual retry may still reach it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobView::Failed { .. } | JobView::NoResults | JobView::Results { .. }
        )
    }

    pub fn actions(&self) -> Vec<ViewAction> {
        match self {
            JobView::Starting | JobView::InProgress { .. } => vec![ViewAction::Refresh],
            JobView::Failed { .. } => vec![ViewAction::StartNew, ViewAction::Retry],
            JobView::NoResults | JobView::Results { .. } => vec![ViewAction::StartNew],
            JobView::NotFound => vec![ViewAction::BackToList, ViewAction::Retry],
            JobView::Error { .. } => vec![ViewAction::Retry, ViewAction::BackToList],
        }
    }

    pub fn action_labels(&self, kind: JobKind) -> Vec<String> {
        self.actions().into_iter().map(|a| a.label(kind)).collect()
    }
}

impl<R: ResultSummary> JobView<R> {
    pub fn headline(&self, kind: JobKind) -> String {
        match self {
            JobView::Starting => format!("{} is starting up", kind.label()),
            JobView::InProgress {
                progress: Some(progress),
                ..
            } => format!("{} in progress ({:.0}%)", kind.label(), progress.percentage),
            JobView::InProgress { status, .. } => format!("{} {}", kind.label(), status),
            JobView::Failed { .. } => format!("{} failed", kind.label()),
            JobView::NoResults => "No results found".to_string(),
            JobView::Results { result, .. } => result.headline(),
            JobView::NotFound => format!("{} not found", kind.label()),
            JobView::Error { .. } => format!("Could not load {}", kind.label().to_lowercase()),
        }
    }

    pub fn lines(&self) -> Vec<String> {
        match self {
            JobView::InProgress {
                progress: Some(progress),
                ..
            } => {
                let mut lines = Vec::new();
                if let Some(stage) = &progress.stage {
                    lines.push(format!("Stage: {}", stage));
                }
                if let Some(remaining) = progress.estimated_time_remaining {
                    lines.push(format!("About {}s remaining", remaining));
                }
                lines
            }
            JobView::Failed { message } | JobView::Error { message } => vec![message.clone()],
            JobView::Results {
                result,
                partial,
                caveats,
            } => {
                let mut lines = result.details();
                if *partial {
                    lines.push("Some sources could not be checked; results are partial.".to_string());
                }
                lines.extend(caveats.iter().cloned());
                lines
            }
            JobView::NotFound => {
                vec!["The job may have been deleted or never started.".to_string()]
            }
            JobView::Starting | JobView::InProgress { progress: None, .. } | JobView::NoResults => {
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::testing::Verdict;

    const ALL_STATUSES: [JobStatus; 10] = [
        JobStatus::Queued,
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Searching,
        JobStatus::Analyzing,
        JobStatus::Completed,
        JobStatus::Partial,
        JobStatus::Failed,
        JobStatus::NoResults,
        JobStatus::Unknown,
    ];

    #[test]
    fn test_status_mapping_is_total() {
        let result = Verdict("ok".to_string());
        for status in ALL_STATUSES {
            let view = JobView::from_status(JobKind::Geolocation, status, Some(&result), Some("err"), &[]);
            let expected = match status.coarse() {
                crate::models::job::CoarseStatus::Terminal => match status {
                    JobStatus::Failed => "failed",
                    JobStatus::NoResults => "no-results",
                    _ => "results",
                },
                _ => "in-progress",
            };
            assert_eq!(view.name(), expected, "status {}", status);
        }
    }

    #[test]
    fn test_partial_keeps_caveats() {
        let caveats = vec!["tineye could not be searched".to_string()];
        let view = JobView::from_status(
            JobKind::ReverseLookup,
            JobStatus::Partial,
            Some(&Verdict("2 matches".to_string())),
            None,
            &caveats,
        );
        match &view {
            JobView::Results { partial, caveats, .. } => {
                assert!(*partial);
                assert_eq!(caveats.len(), 1);
            }
            other => panic!("unexpected view {:?}", other),
        }
        assert!(view.lines().contains(&"tineye could not be searched".to_string()));
    }

    #[test]
    fn test_failed_falls_back_to_generic_message() {
        let view: JobView<Verdict> =
            JobView::from_status(JobKind::ReverseLookup, JobStatus::Failed, None, Some(""), &[]);
        assert_eq!(
            view,
            JobView::Failed {
                message: JobKind::ReverseLookup.failure_fallback().to_string()
            }
        );
        assert_eq!(
            view.action_labels(JobKind::ReverseLookup),
            vec!["Start New Lookup".to_string(), "Retry".to_string()]
        );
    }

    #[test]
    fn test_poll_phases_map_to_session_views() {
        let mut state: PollState<Verdict> = PollState::new(None);
        assert_eq!(JobView::from_poll(&state), JobView::Starting);

        state.phase = PollPhase::NotFound;
        let view = JobView::from_poll(&state);
        assert_eq!(view, JobView::NotFound);
        assert!(!view.is_terminal());
        assert_eq!(view.actions(), vec![ViewAction::BackToList, ViewAction::Retry]);

        // A terminal snapshot outranks the session phase.
        state.data = Some(Job::from_parts(
            "j1",
            JobKind::Geolocation,
            JobStatus::NoResults,
            None,
            None,
            None,
        ));
        assert_eq!(JobView::from_poll(&state), JobView::NoResults);
    }

    #[test]
    fn test_seeded_queued_job_shows_in_progress() {
        let state: PollState<Verdict> = PollState::new(Some(Job::queued("j1", JobKind::Geolocation)));
        assert_eq!(
            JobView::from_poll(&state),
            JobView::InProgress {
                status: JobStatus::Queued,
                progress: None
            }
        );
    }

    #[test]
    fn test_halted_poll_offers_retry() {
        let mut state: PollState<Verdict> = PollState::new(Some(Job::queued("j1", JobKind::ClaimResearch)));
        state.phase = PollPhase::Error;
        state.last_error = Some("Your session has expired. Please sign in again.".to_string());

        let view = JobView::from_poll(&state);
        assert_eq!(view.name(), "error");
        assert!(!view.is_terminal());
        assert_eq!(
            view.action_labels(JobKind::ClaimResearch),
            vec!["Retry".to_string(), "Back to List".to_string()]
        );
        assert_eq!(
            view.lines(),
            vec!["Your session has expired. Please sign in again.".to_string()]
        );
    }
}
