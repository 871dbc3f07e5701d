use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use crate::config::TrackerConfig;
use crate::error::ApiError;
use crate::flows::JobFlow;
use crate::models::job::{Job, JobStatus};
use crate::services::api::FetchOutcome;

/// Where a poll session stands, independent of the job's own status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    /// No usable snapshot yet: 202s and early 404s land here.
    Starting,
    Tracking,
    /// The not-found budget is spent; only a manual refetch polls again.
    NotFound,
    /// A fetch failed in a way retrying on a timer cannot fix (expired session, 4xx).
    Error,
}

/// Latest state of one poll session.
#[derive(Debug, Clone)]
pub struct PollState<R> {
    pub data: Option<Job<R>>,
    pub phase: PollPhase,
    /// First fetch in flight with nothing to show yet
    pub is_loading: bool,
    /// Any fetch in flight, including background refetches
    pub is_fetching: bool,
    pub is_error: bool,
    pub last_error: Option<String>,
    /// Settled fetches so far
    pub fetch_count: u64,
    pub not_found_streak: u32,
}

impl<R> PollState<R> {
    pub fn new(initial: Option<Job<R>>) -> Self {
        Self {
            is_loading: initial.is_none(),
            phase: if initial.is_some() {
                PollPhase::Tracking
            } else {
                PollPhase::Starting
            },
            data: initial,
            is_fetching: false,
            is_error: false,
            last_error: None,
            fetch_count: 0,
            not_found_streak: 0,
        }
    }

    pub fn status(&self) -> Option<JobStatus> {
        self.data.as_ref().map(|job| job.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.data.as_ref().is_some_and(Job::is_terminal)
    }

    /// Fold one settled fetch into the state and return the delay before the next one.
    ///
    /// `None` means automatic polling is over: the job is terminal, the
    /// not-found budget is spent or the fetch failed for good.
    pub(crate) fn settle(
        &mut self,
        outcome: Result<FetchOutcome<Job<R>>, ApiError>,
        options: &PollOptions,
        interval: Duration,
    ) -> Option<Duration> {
        self.is_fetching = false;
        self.is_loading = false;
        self.fetch_count += 1;

        match outcome {
            Ok(FetchOutcome::Ready(job)) => {
                self.is_error = false;
                self.last_error = None;
                self.not_found_streak = 0;
                self.phase = PollPhase::Tracking;
                match &mut self.data {
                    Some(current) => {
                        if !current.absorb(job) {
                            tracing::debug!(job_id = %current.id, "Ignoring snapshot for terminal job");
                        }
                    }
                    None => self.data = Some(job),
                }
                if self.is_terminal() {
                    None
                } else {
                    Some(interval)
                }
            }
            Ok(FetchOutcome::NotReady) => {
                self.is_error = false;
                self.last_error = None;
                self.not_found_streak = 0;
                self.phase = self.idle_phase();
                Some(interval)
            }
            Ok(FetchOutcome::NotFound) => {
                self.is_error = false;
                self.last_error = None;
                self.not_found_streak += 1;
                if self.not_found_streak > options.not_found_budget {
                    self.phase = PollPhase::NotFound;
                    return None;
                }
                self.phase = self.idle_phase();
                Some(options.warmup_backoff(self.not_found_streak, interval))
            }
            Err(e) => {
                self.is_error = true;
                self.last_error = Some(e.user_message());
                if e.is_transient() {
                    Some(interval)
                } else {
                    self.phase = PollPhase::Error;
                    None
                }
            }
        }
    }

    /// Phase for a reply that carries no snapshot: a known job keeps its last view.
    fn idle_phase(&self) -> PollPhase {
        if self.data.is_some() {
            PollPhase::Tracking
        } else {
            PollPhase::Starting
        }
    }

    /// Clear an exhausted budget or a hard failure before a manual retry.
    fn rearm(&mut self) {
        if matches!(self.phase, PollPhase::NotFound | PollPhase::Error) {
            self.not_found_streak = 0;
            self.phase = self.idle_phase();
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Overrides the flow's own interval when set
    pub interval: Option<Duration>,
    pub warmup_delay: Duration,
    pub not_found_budget: u32,
    pub enabled: bool,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: None,
            warmup_delay: Duration::from_secs(2),
            not_found_budget: 5,
            enabled: true,
        }
    }
}

impl PollOptions {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            warmup_delay: config.warmup_delay(),
            not_found_budget: config.not_found_budget,
            enabled: true,
        }
    }

    /// Doubling delay after consecutive 404s, never longer than the poll interval.
    pub fn warmup_backoff(&self, streak: u32, interval: Duration) -> Duration {
        let factor = 1u32 << streak.saturating_sub(1).min(16);
        self.warmup_delay.saturating_mul(factor).min(interval)
    }
}

/// Spawns poll sessions.
pub struct StatusPoller;

impl StatusPoller {
    pub fn spawn<F: JobFlow>(flow: Arc<F>, key: F::Key, options: PollOptions) -> PollerHandle<F::Output> {
        Self::spawn_with(flow, key, options, None)
    }

    /// Start from a known snapshot, e.g. the `queued` job set right after submission.
    pub fn spawn_with<F: JobFlow>(
        flow: Arc<F>,
        key: F::Key,
        options: PollOptions,
        initial: Option<Job<F::Output>>,
    ) -> PollerHandle<F::Output> {
        Self::launch(flow, key, options, initial, None)
    }

    /// Like `spawn_with`, but also hands back every settled fetch in order.
    ///
    /// The watch channel behind `subscribe` only keeps the latest state, so a
    /// slow reader can miss fetches; this receiver never does.
    pub fn spawn_reporting<F: JobFlow>(
        flow: Arc<F>,
        key: F::Key,
        options: PollOptions,
        initial: Option<Job<F::Output>>,
    ) -> (PollerHandle<F::Output>, mpsc::UnboundedReceiver<PollState<F::Output>>) {
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let handle = Self::launch(flow, key, options, initial, Some(settled_tx));
        (handle, settled_rx)
    }

    fn launch<F: JobFlow>(
        flow: Arc<F>,
        key: F::Key,
        options: PollOptions,
        initial: Option<Job<F::Output>>,
        settled: Option<mpsc::UnboundedSender<PollState<F::Output>>>,
    ) -> PollerHandle<F::Output> {
        let (state_tx, state_rx) = watch::channel(PollState::new(initial));
        let (enabled_tx, enabled_rx) = watch::channel(options.enabled);
        let refetch = Arc::new(Notify::new());
        let in_flight = Arc::new(AtomicBool::new(false));

        let session = PollSession {
            flow,
            key,
            options,
            state: state_tx,
            settled,
            enabled: enabled_rx,
            refetch: refetch.clone(),
            in_flight: in_flight.clone(),
        };
        let task = tokio::spawn(session.run());

        PollerHandle {
            state: state_rx,
            enabled: enabled_tx,
            refetch,
            in_flight,
            task,
        }
    }
}

/// Owner of a poll session. Dropping it stops all further fetches.
pub struct PollerHandle<R> {
    state: watch::Receiver<PollState<R>>,
    enabled: watch::Sender<bool>,
    refetch: Arc<Notify>,
    in_flight: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl<R: Clone> PollerHandle<R> {
    pub fn snapshot(&self) -> PollState<R> {
        self.state.borrow().clone()
    }
}

impl<R> PollerHandle<R> {
    pub fn subscribe(&self) -> watch::Receiver<PollState<R>> {
        self.state.clone()
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Ask for an immediate fetch. Returns `false` when one is already in flight
    /// or the session has ended.
    pub fn refetch(&self) -> bool {
        if self.task.is_finished() {
            return false;
        }
        if self.in_flight.load(Ordering::SeqCst) {
            tracing::debug!("Refetch ignored, fetch already in flight");
            return false;
        }
        self.refetch.notify_one();
        true
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.send_replace(enabled);
    }

    /// Whether the session has stopped for good (terminal job or dropped flow).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<R> Drop for PollerHandle<R> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct PollSession<F: JobFlow> {
    flow: Arc<F>,
    key: F::Key,
    options: PollOptions,
    state: watch::Sender<PollState<F::Output>>,
    settled: Option<mpsc::UnboundedSender<PollState<F::Output>>>,
    enabled: watch::Receiver<bool>,
    refetch: Arc<Notify>,
    in_flight: Arc<AtomicBool>,
}

impl<F: JobFlow> PollSession<F> {
    async fn run(mut self) {
        let kind = self.flow.kind();
        let interval = self.options.interval.unwrap_or_else(|| self.flow.poll_interval());
        let mut delay = Some(Duration::ZERO);

        tracing::debug!(job_id = %self.key, kind = %kind, interval_ms = interval.as_millis() as u64, "Poll session started");

        loop {
            if self.state.borrow().is_terminal() {
                break;
            }

            let automatic = *self.enabled.borrow();
            let woke = match delay.filter(|_| automatic) {
                Some(wait) => tokio::select! {
                    _ = tokio::time::sleep(wait) => Wake::Timer,
                    _ = self.refetch.notified() => Wake::Manual,
                    changed = self.enabled.changed() => Wake::Enabled(changed.is_ok()),
                },
                None => tokio::select! {
                    _ = self.refetch.notified() => Wake::Manual,
                    changed = self.enabled.changed() => Wake::Enabled(changed.is_ok()),
                },
            };

            match woke {
                Wake::Enabled(false) => break,
                Wake::Enabled(true) => {
                    if *self.enabled.borrow() && delay.is_some() {
                        delay = Some(Duration::ZERO);
                    }
                    continue;
                }
                Wake::Manual => self.state.send_modify(PollState::rearm),
                Wake::Timer => {}
            }

            self.in_flight.store(true, Ordering::SeqCst);
            self.state.send_modify(|s| {
                s.is_fetching = true;
                s.is_loading = s.data.is_none();
            });

            let outcome = self.flow.fetch(&self.key).await;
            metrics::counter!("tracker_polls_total", "kind" => kind.to_string()).increment(1);

            match &outcome {
                Ok(FetchOutcome::Ready(job)) => {
                    tracing::debug!(job_id = %self.key, status = %job.status, "Fetched job snapshot")
                }
                Ok(FetchOutcome::NotReady) => tracing::debug!(job_id = %self.key, "Job not ready yet"),
                Ok(FetchOutcome::NotFound) => tracing::debug!(job_id = %self.key, "Job not found yet"),
                Err(e) if e.is_transient() => {
                    metrics::counter!("tracker_poll_errors_total", "kind" => kind.to_string()).increment(1);
                    tracing::debug!(job_id = %self.key, error = %e, "Transient poll failure")
                }
                Err(e) => {
                    metrics::counter!("tracker_poll_errors_total", "kind" => kind.to_string()).increment(1);
                    tracing::warn!(job_id = %self.key, error = %e, "Poll failed")
                }
            }

            let options = &self.options;
            self.state.send_modify(|s| delay = s.settle(outcome, options, interval));
            self.in_flight.store(false, Ordering::SeqCst);
            if let Some(settled) = &self.settled {
                let _ = settled.send(self.state.borrow().clone());
            }

            if delay.is_none() {
                match self.state.borrow().phase {
                    PollPhase::NotFound => {
                        tracing::info!(job_id = %self.key, "Not-found budget exhausted, waiting for manual retry")
                    }
                    PollPhase::Error => {
                        tracing::info!(job_id = %self.key, "Polling halted after a failed fetch, waiting for manual retry")
                    }
                    PollPhase::Starting | PollPhase::Tracking => {}
                }
            }
        }

        tracing::debug!(job_id = %self.key, "Poll session finished");
    }
}

enum Wake {
    Timer,
    Manual,
    Enabled(bool),
}
