use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::TrackerConfig;
use crate::error::{StreamError, GENERIC_FAILURE_MESSAGE};
use crate::flows::JobFlow;
use crate::models::job::{CoarseStatus, Job, JobKind, JobStatus};
use crate::models::step::StepUpdate;
use crate::tracking::connectivity::Connectivity;
use crate::tracking::notice::Notice;
use crate::tracking::poller::{PollOptions, PollPhase, PollState, PollerHandle, StatusPoller};
use crate::tracking::staleness::{StalenessMonitor, DEFAULT_STALE_AFTER, DEFAULT_STALE_CHECK_INTERVAL};
use crate::tracking::stream::{ConnectionState, StreamHandle, StreamHandler, StreamOptions, StreamSubscriber};
use crate::tracking::view::JobView;

#[derive(Debug, Clone)]
pub struct TrackerOptions {
    pub poll: PollOptions,
    pub stale_after: Duration,
    pub stale_check_interval: Duration,
    pub stream: StreamOptions,
    /// Subscribe to live steps on pipelines that offer them
    pub use_stream: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            poll: PollOptions::default(),
            stale_after: DEFAULT_STALE_AFTER,
            stale_check_interval: DEFAULT_STALE_CHECK_INTERVAL,
            stream: StreamOptions::default(),
            use_stream: true,
        }
    }
}

impl TrackerOptions {
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self {
            poll: PollOptions::from_config(config),
            stale_after: config.stale_after(),
            stale_check_interval: config.stale_check_interval(),
            stream: StreamOptions {
                reconnect_attempts: config.stream_reconnect_attempts,
                ..StreamOptions::default()
            },
            use_stream: true,
        }
    }
}

/// What a tracked job reports to its consumer.
#[derive(Debug, Clone)]
pub enum TrackerEvent<R> {
    /// Emitted once per settled fetch
    View(JobView<R>),
    Step(StepUpdate),
    Notice(Notice),
    /// Terminal view; no further events follow.
    Finished(JobView<R>),
}

impl<R> TrackerEvent<R> {
    pub fn name(&self) -> &'static str {
        match self {
            TrackerEvent::View(_) => "view",
            TrackerEvent::Step(_) => "step",
            TrackerEvent::Notice(_) => "notice",
            TrackerEvent::Finished(_) => "finished",
        }
    }
}

enum Command {
    ContinueMonitoring,
}

/// Tracks one job: polling, the optional step stream, staleness and
/// connectivity, all owned by a single task.
///
/// Dropping the tracker tears the whole session down.
pub struct JobTracker<R> {
    kind: JobKind,
    poller: Arc<PollerHandle<R>>,
    events: mpsc::UnboundedReceiver<TrackerEvent<R>>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl<R: Clone + Send + Sync + 'static> JobTracker<R> {
    pub fn start<F>(
        flow: Arc<F>,
        key: F::Key,
        options: TrackerOptions,
        connectivity: watch::Receiver<Connectivity>,
    ) -> Self
    where
        F: JobFlow<Output = R>,
    {
        Self::start_with(flow, key, options, connectivity, None)
    }

    /// Start from a known snapshot. Its view is queued before any fetch happens.
    pub fn start_with<F>(
        flow: Arc<F>,
        key: F::Key,
        options: TrackerOptions,
        connectivity: watch::Receiver<Connectivity>,
        initial: Option<Job<R>>,
    ) -> Self
    where
        F: JobFlow<Output = R>,
    {
        let kind = flow.kind();
        let age = initial
            .as_ref()
            .and_then(|job| (Utc::now() - job.submitted_at).to_std().ok())
            .unwrap_or_default();
        let now = Instant::now();
        let started_at = now.checked_sub(age).unwrap_or(now);

        let first = PollState::new(initial.clone());
        let (poller, settled) =
            StatusPoller::spawn_reporting(flow.clone(), key.clone(), options.poll.clone(), initial);
        let poller = Arc::new(poller);
        let poll_rx = poller.subscribe();

        let (events_tx, events) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();

        if !first.is_terminal() {
            let _ = events_tx.send(TrackerEvent::View(JobView::from_poll(&first)));
        }

        tracing::info!(job_id = %key, kind = %kind, "Tracking job");

        let session = TrackerSession {
            staleness: StalenessMonitor::new(started_at, options.stale_after),
            flow,
            key,
            options,
            poller: poller.clone(),
            poll_rx,
            settled,
            events: events_tx,
            commands: commands_rx,
            connectivity: Some(connectivity),
            stream: None,
            stream_done: false,
            stream_tx,
            stream_rx,
            reported_not_found: false,
            reported_error: false,
            started_at: now,
            _active: ActiveSession::new(),
        };
        let task = tokio::spawn(session.run(first));

        Self {
            kind,
            poller,
            events,
            commands,
            task,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn poll_state(&self) -> PollState<R> {
        self.poller.snapshot()
    }

    pub async fn next_event(&mut self) -> Option<TrackerEvent<R>> {
        self.events.recv().await
    }

    pub fn try_next_event(&mut self) -> Option<TrackerEvent<R>> {
        self.events.try_recv().ok()
    }

    /// Manual refresh. Ignored while a fetch is already in flight.
    pub fn refetch(&self) -> bool {
        self.poller.refetch()
    }

    /// Acknowledge a staleness warning and keep watching the job.
    pub fn continue_monitoring(&self) {
        let _ = self.commands.send(Command::ContinueMonitoring);
    }

    /// Drain events until the job finishes, is reported missing or polling halts on an error.
    pub async fn wait(&mut self) -> Option<JobView<R>> {
        while let Some(event) = self.next_event().await {
            match event {
                TrackerEvent::Finished(view) => return Some(view),
                TrackerEvent::View(view @ (JobView::NotFound | JobView::Error { .. })) => return Some(view),
                _ => {}
            }
        }
        None
    }
}

impl<R> Drop for JobTracker<R> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Keeps `tracker_active_sessions` in step with live sessions.
struct ActiveSession;

impl ActiveSession {
    fn new() -> Self {
        metrics::gauge!("tracker_active_sessions").increment(1.0);
        Self
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        metrics::gauge!("tracker_active_sessions").decrement(1.0);
    }
}

enum StreamMessage {
    Update(StepUpdate),
    Complete,
    Error { reason: String, fatal: bool },
    Closed,
}

/// Forwards stream callbacks into the session task.
struct ChannelHandler(mpsc::UnboundedSender<StreamMessage>);

impl StreamHandler for ChannelHandler {
    fn on_update(&mut self, update: StepUpdate) {
        let _ = self.0.send(StreamMessage::Update(update));
    }

    fn on_complete(&mut self) {
        let _ = self.0.send(StreamMessage::Complete);
    }

    fn on_error(&mut self, error: &StreamError) {
        let _ = self.0.send(StreamMessage::Error {
            reason: error.to_string(),
            fatal: !error.is_reconnectable(),
        });
    }

    fn on_state(&mut self, state: ConnectionState) {
        if state == ConnectionState::Closed {
            let _ = self.0.send(StreamMessage::Closed);
        }
    }
}

struct TrackerSession<F: JobFlow> {
    flow: Arc<F>,
    key: F::Key,
    options: TrackerOptions,
    poller: Arc<PollerHandle<F::Output>>,
    poll_rx: watch::Receiver<PollState<F::Output>>,
    /// One state per settled fetch, in order
    settled: mpsc::UnboundedReceiver<PollState<F::Output>>,
    events: mpsc::UnboundedSender<TrackerEvent<F::Output>>,
    commands: mpsc::UnboundedReceiver<Command>,
    connectivity: Option<watch::Receiver<Connectivity>>,
    staleness: StalenessMonitor,
    stream: Option<StreamHandle>,
    stream_done: bool,
    stream_tx: mpsc::UnboundedSender<StreamMessage>,
    stream_rx: mpsc::UnboundedReceiver<StreamMessage>,
    reported_not_found: bool,
    reported_error: bool,
    started_at: Instant,
    _active: ActiveSession,
}

impl<F: JobFlow> TrackerSession<F> {
    async fn run(mut self, first: PollState<F::Output>) {
        let check_every = self.options.stale_check_interval;
        let mut stale_ticker = tokio::time::interval_at(Instant::now() + check_every, check_every);
        stale_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // A resumed job may already be terminal or processing.
        if first.is_terminal() {
            self.finish(&first);
            return;
        }
        self.sync_stream(first.status());

        loop {
            tokio::select! {
                settled = self.settled.recv() => match settled {
                    Some(state) => {
                        if self.observe(state) {
                            return;
                        }
                    }
                    None => break,
                },
                Some(message) = self.stream_rx.recv() => self.on_stream(message),
                _ = stale_ticker.tick() => self.check_staleness(),
                changed = connectivity_changed(&mut self.connectivity) => self.on_connectivity(changed),
                Some(command) = self.commands.recv() => match command {
                    Command::ContinueMonitoring => {
                        tracing::info!(job_id = %self.key, "Continuing to monitor stale job");
                        self.staleness.restart(Instant::now());
                    }
                },
            }
        }

        tracing::debug!(job_id = %self.key, "Poll session ended before the job finished");
    }

    /// Handle one settled fetch. Returns `true` once the job is terminal.
    fn observe(&mut self, state: PollState<F::Output>) -> bool {
        if state.is_error && state.phase != PollPhase::Error {
            tracing::debug!(
                job_id = %self.key,
                error = state.last_error.as_deref().unwrap_or_default(),
                "Keeping last view after failed fetch"
            );
            if !self.reported_error {
                self.reported_error = true;
                self.emit(TrackerEvent::Notice(Notice::FetchFailed {
                    message: state
                        .last_error
                        .clone()
                        .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
                }));
            }
            return false;
        }
        if !state.is_error && self.reported_error {
            self.reported_error = false;
            self.emit(TrackerEvent::Notice(Notice::FetchRecovered));
        }

        if state.is_terminal() {
            self.finish(&state);
            return true;
        }

        let view = JobView::from_poll(&state);
        match &view {
            JobView::NotFound => {
                if !self.reported_not_found {
                    self.reported_not_found = true;
                    self.emit(TrackerEvent::Notice(Notice::NotFound));
                }
            }
            JobView::Error { message } => {
                tracing::warn!(job_id = %self.key, error = %message, "Tracking halted, waiting for a manual retry");
                self.reported_error = true;
            }
            _ => self.reported_not_found = false,
        }
        self.emit(TrackerEvent::View(view));

        self.sync_stream(state.status());
        false
    }

    fn finish(&mut self, state: &PollState<F::Output>) {
        let view = JobView::from_poll(state);
        let kind = self.flow.kind();
        self.stream = None;

        if let JobView::Failed { message } = &view {
            self.emit(TrackerEvent::Notice(Notice::JobFailed {
                message: message.clone(),
            }));
        }

        let elapsed = self.started_at.elapsed();
        metrics::counter!("tracker_jobs_finished_total", "kind" => kind.to_string(), "outcome" => view.name())
            .increment(1);
        metrics::histogram!("tracker_job_duration_seconds", "kind" => kind.to_string())
            .record(elapsed.as_secs_f64());
        tracing::info!(
            job_id = %self.key,
            kind = %kind,
            status = ?state.status(),
            outcome = view.name(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Job finished"
        );

        self.emit(TrackerEvent::Finished(view));
    }

    /// Open the step stream once the job is processing, if the pipeline has one.
    fn sync_stream(&mut self, status: Option<JobStatus>) {
        let processing = status.is_some_and(|s| s.coarse() == CoarseStatus::Processing);
        if !processing
            || !self.options.use_stream
            || !self.flow.supports_streaming()
            || self.stream.is_some()
            || self.stream_done
        {
            return;
        }

        tracing::debug!(job_id = %self.key, "Subscribing to step stream");
        self.stream = Some(StreamSubscriber::spawn(
            self.flow.clone(),
            self.key.clone(),
            ChannelHandler(self.stream_tx.clone()),
            self.options.stream.clone(),
        ));
    }

    fn on_stream(&mut self, message: StreamMessage) {
        match message {
            StreamMessage::Update(update) => self.emit(TrackerEvent::Step(update)),
            StreamMessage::Complete => {
                // The stream only signals; the poller fetches the authoritative snapshot.
                self.stream_done = true;
                self.stream = None;
                self.poller.refetch();
            }
            StreamMessage::Error { reason, fatal } => {
                self.emit(TrackerEvent::Notice(Notice::StreamDisconnected { reason }));
                if fatal {
                    self.poller.refetch();
                }
            }
            StreamMessage::Closed => {
                self.stream_done = true;
                self.stream = None;
            }
        }
    }

    fn check_staleness(&mut self) {
        let status = self.poll_rx.borrow().status();
        if let Some(warning) = self.staleness.check(Instant::now(), status) {
            metrics::counter!("tracker_stale_warnings_total", "kind" => self.flow.kind().to_string()).increment(1);
            tracing::warn!(
                job_id = %self.key,
                elapsed_secs = warning.elapsed.as_secs(),
                "Job has been processing for longer than expected"
            );
            self.emit(TrackerEvent::Notice(Notice::Stale {
                elapsed: warning.elapsed,
            }));
        }
    }

    fn on_connectivity(&mut self, changed: Option<Connectivity>) {
        match changed {
            None => {
                tracing::debug!(job_id = %self.key, "Connectivity source gone");
                self.connectivity = None;
            }
            Some(Connectivity::Offline) => {
                tracing::info!(job_id = %self.key, "Offline, keeping poll session alive");
                self.emit(TrackerEvent::Notice(Notice::Offline));
            }
            Some(Connectivity::Online) => {
                self.emit(TrackerEvent::Notice(Notice::BackOnline));
                let in_flight = self
                    .poll_rx
                    .borrow()
                    .status()
                    .is_some_and(|s| s.coarse() != CoarseStatus::Terminal);
                if in_flight {
                    tracing::info!(job_id = %self.key, "Back online, refreshing job status");
                    self.poller.refetch();
                }
            }
        }
    }

    fn emit(&self, event: TrackerEvent<F::Output>) {
        let _ = self.events.send(event);
    }
}

/// Next connectivity transition; pends forever once the source is gone.
async fn connectivity_changed(rx: &mut Option<watch::Receiver<Connectivity>>) -> Option<Connectivity> {
    match rx {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(*rx.borrow_and_update()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}
