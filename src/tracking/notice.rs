use std::time::Duration;

/// How prominently a notice should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// User-facing notification raised while a job is tracked.
///
/// The tracking core only emits these as events; presenting them is up to
/// whoever consumes the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Still processing after the staleness threshold
    Stale { elapsed: Duration },
    Offline,
    BackOnline,
    StreamDisconnected { reason: String },
    JobFailed { message: String },
    SubmitFailed { message: String },
    NotFound,
    /// A status fetch failed; polling carries on with the last view.
    FetchFailed { message: String },
    /// Status fetches succeed again after a failure.
    FetchRecovered,
}

impl Notice {
    pub fn severity(&self) -> Severity {
        match self {
            Notice::BackOnline | Notice::FetchRecovered => Severity::Success,
            Notice::StreamDisconnected { .. } => Severity::Info,
            Notice::Stale { .. } | Notice::Offline | Notice::FetchFailed { .. } => Severity::Warning,
            Notice::JobFailed { .. } | Notice::SubmitFailed { .. } | Notice::NotFound => Severity::Error,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notice::Stale { elapsed } => format!(
                "This job has been processing for {} minutes. It may be stuck; you can keep monitoring or start over.",
                elapsed.as_secs() / 60
            ),
            Notice::Offline => "You are offline. Status updates will resume when the connection returns.".to_string(),
            Notice::BackOnline => "Back online. Refreshing job status.".to_string(),
            Notice::StreamDisconnected { reason } => {
                format!("Live updates disconnected ({}). Falling back to polling.", reason)
            }
            Notice::JobFailed { message } => message.clone(),
            Notice::SubmitFailed { message } => format!("Could not start the job: {}", message),
            Notice::NotFound => "The job could not be found.".to_string(),
            Notice::FetchFailed { message } => {
                format!("Could not refresh the job status ({}). Retrying.", message)
            }
            Notice::FetchRecovered => "Job status updates resumed.".to_string(),
        }
    }

    /// Stays visible until the condition clears rather than timing out.
    pub fn is_persistent(&self) -> bool {
        matches!(
            self,
            Notice::Offline | Notice::Stale { .. } | Notice::FetchFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_message_reports_minutes() {
        let notice = Notice::Stale {
            elapsed: Duration::from_secs(660),
        };
        assert!(notice.message().contains("11 minutes"));
        assert_eq!(notice.severity(), Severity::Warning);
        assert!(notice.is_persistent());
    }

    #[test]
    fn test_severities() {
        assert_eq!(Notice::BackOnline.severity(), Severity::Success);
        assert!(!Notice::BackOnline.is_persistent());
        assert_eq!(
            Notice::JobFailed {
                message: "boom".to_string()
            }
            .severity(),
            Severity::Error
        );
        assert!(Severity::Error > Severity::Warning);
    }

    #[test]
    fn test_fetch_failure_stays_until_recovered() {
        let failed = Notice::FetchFailed {
            message: "upstream unavailable".to_string(),
        };
        assert_eq!(failed.severity(), Severity::Warning);
        assert!(failed.is_persistent());
        assert!(failed.message().contains("upstream unavailable"));
        assert_eq!(Notice::FetchRecovered.severity(), Severity::Success);
        assert!(!Notice::FetchRecovered.is_persistent());
    }
}
