use std::time::Duration;
use tokio::time::Instant;

use crate::models::job::{CoarseStatus, JobStatus};

/// Processing time after which a job is flagged as possibly stuck.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(600);

/// How often the tracker runs the staleness check.
pub const DEFAULT_STALE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Raised the first time a processing job crosses the staleness threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleWarning {
    pub elapsed: Duration,
}

/// Advisory timeout for long-running jobs. It never cancels anything; it only
/// reports, once, that a job has been processing for unusually long.
#[derive(Debug, Clone)]
pub struct StalenessMonitor {
    started_at: Instant,
    stale_after: Duration,
    is_stale: bool,
}

impl StalenessMonitor {
    pub fn new(started_at: Instant, stale_after: Duration) -> Self {
        Self {
            started_at,
            stale_after,
            is_stale: false,
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    /// Returns a warning on the first check that finds a processing job past the threshold.
    pub fn check(&mut self, now: Instant, status: Option<JobStatus>) -> Option<StaleWarning> {
        if self.is_stale {
            return None;
        }
        let processing = status.is_some_and(|s| s.coarse() == CoarseStatus::Processing);
        if !processing {
            return None;
        }

        let elapsed = self.elapsed(now);
        if elapsed < self.stale_after {
            return None;
        }
        self.is_stale = true;
        Some(StaleWarning { elapsed })
    }

    /// Start a fresh observation window ("continue monitoring").
    pub fn restart(&mut self, now: Instant) {
        self.started_at = now;
        self.is_stale = false;
    }
}
