use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::StreamError;
use crate::flows::JobFlow;
use crate::models::step::{StepUpdate, StreamEvent};

/// Receives step-stream callbacks, in receipt order.
pub trait StreamHandler: Send + 'static {
    fn on_update(&mut self, update: StepUpdate);

    /// The backend signalled completion; the subscription is over.
    fn on_complete(&mut self);

    /// The connection failed or the backend reported an error. A reconnect
    /// may follow unless the error is final.
    fn on_error(&mut self, error: &StreamError);

    fn on_state(&mut self, _state: ConnectionState) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(2),
        }
    }
}

/// Connection state plus every update received so far. Updates are only ever appended.
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub state: ConnectionState,
    pub updates: Vec<StepUpdate>,
    pub reconnects: u32,
}

/// Spawns step-stream subscriptions.
pub struct StreamSubscriber;

impl StreamSubscriber {
    pub fn spawn<F, H>(flow: Arc<F>, key: F::Key, handler: H, options: StreamOptions) -> StreamHandle
    where
        F: JobFlow,
        H: StreamHandler,
    {
        let (session_tx, session_rx) = watch::channel(StreamSession {
            state: ConnectionState::Connecting,
            updates: Vec::new(),
            reconnects: 0,
        });
        let task = tokio::spawn(
            Subscription {
                flow,
                key,
                handler,
                options,
                session: session_tx,
            }
            .run(),
        );
        StreamHandle {
            session: session_rx,
            task,
        }
    }
}

/// Owner of a subscription. Dropping it closes the connection.
pub struct StreamHandle {
    session: watch::Receiver<StreamSession>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    pub fn session(&self) -> StreamSession {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StreamSession> {
        self.session.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Subscription<F: JobFlow, H> {
    flow: Arc<F>,
    key: F::Key,
    handler: H,
    options: StreamOptions,
    session: watch::Sender<StreamSession>,
}

impl<F: JobFlow, H: StreamHandler> Subscription<F, H> {
    async fn run(mut self) {
        let kind = self.flow.kind();
        let mut attempts = 0u32;

        loop {
            self.set_state(ConnectionState::Connecting);

            let error = match self.flow.open_stream(&self.key).await {
                Ok(None) => {
                    tracing::debug!(job_id = %self.key, kind = %kind, "No step stream available");
                    self.set_state(ConnectionState::Closed);
                    return;
                }
                Ok(Some(mut stream)) => {
                    tracing::debug!(job_id = %self.key, kind = %kind, "Step stream open");
                    self.set_state(ConnectionState::Open);
                    loop {
                        match stream.next().await {
                            Some(Ok(StreamEvent::Step(update))) => {
                                // A connection that delivers earns a fresh reconnect budget.
                                attempts = 0;
                                self.session.send_modify(|s| s.updates.push(update.clone()));
                                self.handler.on_update(update);
                            }
                            Some(Ok(StreamEvent::Complete)) => {
                                tracing::debug!(job_id = %self.key, "Step stream complete");
                                self.handler.on_complete();
                                self.set_state(ConnectionState::Closed);
                                return;
                            }
                            Some(Ok(StreamEvent::Failed(message))) => break StreamError::Remote(message),
                            Some(Err(StreamError::Malformed(e))) => {
                                tracing::warn!(job_id = %self.key, error = %e, "Skipping malformed step event");
                            }
                            Some(Err(e)) => break e,
                            None => break StreamError::Closed,
                        }
                    }
                }
                Err(e) => StreamError::Open(e),
            };

            self.set_state(ConnectionState::Errored);
            self.handler.on_error(&error);

            if !error.is_reconnectable() || attempts >= self.options.reconnect_attempts {
                tracing::info!(job_id = %self.key, error = %error, attempts, "Step stream closed");
                self.set_state(ConnectionState::Closed);
                return;
            }

            attempts += 1;
            metrics::counter!("tracker_stream_reconnects_total", "kind" => kind.to_string()).increment(1);
            tracing::debug!(job_id = %self.key, error = %error, attempt = attempts, "Step stream dropped, reconnecting");
            self.session.send_modify(|s| s.reconnects += 1);
            tokio::time::sleep(self.options.reconnect_delay).await;
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        let changed = self.session.send_if_modified(|s| {
            if s.state == state {
                false
            } else {
                s.state = state;
                true
            }
        });
        if changed {
            self.handler.on_state(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::JobRef;
    use crate::tracking::testing::{Reply, ScriptedFlow, StreamItem};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl StreamHandler for Recorder {
        fn on_update(&mut self, update: StepUpdate) {
            self.0.lock().unwrap().push(format!("update:{}", update.step));
        }

        fn on_complete(&mut self) {
            self.0.lock().unwrap().push("complete".to_string());
        }

        fn on_error(&mut self, error: &StreamError) {
            let tag = if error.is_reconnectable() { "error" } else { "fatal" };
            self.0.lock().unwrap().push(tag.to_string());
        }
    }

    fn options() -> StreamOptions {
        StreamOptions {
            reconnect_attempts: 2,
            reconnect_delay: Duration::from_secs(2),
        }
    }

    async fn closed(handle: &StreamHandle) -> StreamSession {
        let mut rx = handle.subscribe();
        let session = rx.wait_for(|s| s.state == ConnectionState::Closed).await.unwrap().clone();
        session
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_arrive_in_order() {
        let flow = ScriptedFlow::streaming(
            vec![Reply::Status(crate::models::job::JobStatus::Processing)],
            vec![vec![
                StreamItem::Step("manifest"),
                StreamItem::Step("signature"),
                StreamItem::Step("signature"),
                StreamItem::Complete,
            ]],
        );
        let recorder = Recorder::default();
        let handle = StreamSubscriber::spawn(flow.clone(), JobRef::new("c1"), recorder.clone(), options());

        let session = closed(&handle).await;
        assert_eq!(
            recorder.events(),
            vec!["update:manifest", "update:signature", "update:signature", "complete"]
        );
        // No de-duplication
        assert_eq!(session.updates.len(), 3);
        assert_eq!(flow.stream_opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_reconnects_and_keeps_history() {
        let flow = ScriptedFlow::streaming(
            vec![],
            vec![
                vec![StreamItem::Step("manifest")],
                vec![StreamItem::Step("signature"), StreamItem::Complete],
            ],
        );
        let recorder = Recorder::default();
        let handle = StreamSubscriber::spawn(flow.clone(), JobRef::new("c1"), recorder.clone(), options());

        let session = closed(&handle).await;
        assert_eq!(
            recorder.events(),
            vec!["update:manifest", "error", "update:signature", "complete"]
        );
        let steps: Vec<_> = session.updates.iter().map(|u| u.step.as_str()).collect();
        assert_eq!(steps, vec!["manifest", "signature"]);
        assert_eq!(session.reconnects, 1);
        assert_eq!(flow.stream_opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_attempts_are_bounded() {
        let flow = ScriptedFlow::streaming(vec![], vec![vec![], vec![], vec![], vec![]]);
        let recorder = Recorder::default();
        let handle = StreamSubscriber::spawn(flow.clone(), JobRef::new("c1"), recorder.clone(), options());

        closed(&handle).await;
        assert_eq!(flow.stream_opens(), 3);
        assert_eq!(recorder.events(), vec!["error", "error", "error"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivering_connections_restore_the_budget() {
        let flow = ScriptedFlow::streaming(
            vec![],
            vec![
                vec![StreamItem::Step("manifest")],
                vec![StreamItem::Step("signature")],
                vec![StreamItem::Step("ai-markers")],
                vec![StreamItem::Step("report"), StreamItem::Complete],
            ],
        );
        let recorder = Recorder::default();
        let handle = StreamSubscriber::spawn(flow.clone(), JobRef::new("c1"), recorder.clone(), options());

        let session = closed(&handle).await;
        assert_eq!(
            recorder.events(),
            vec![
                "update:manifest",
                "error",
                "update:signature",
                "error",
                "update:ai-markers",
                "error",
                "update:report",
                "complete"
            ]
        );
        assert_eq!(session.reconnects, 3);
        assert_eq!(flow.stream_opens(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_error_is_final() {
        let flow = ScriptedFlow::streaming(
            vec![],
            vec![
                vec![StreamItem::Step("manifest"), StreamItem::Failed("verification failed")],
                vec![StreamItem::Complete],
            ],
        );
        let recorder = Recorder::default();
        let handle = StreamSubscriber::spawn(flow.clone(), JobRef::new("c1"), recorder.clone(), options());

        closed(&handle).await;
        assert_eq!(recorder.events(), vec!["update:manifest", "fatal"]);
        assert_eq!(flow.stream_opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_closes_the_connection() {
        let flow = ScriptedFlow::streaming(
            vec![],
            vec![vec![StreamItem::Step("manifest"), StreamItem::Hang]],
        );
        let recorder = Recorder::default();
        let handle = StreamSubscriber::spawn(flow.clone(), JobRef::new("c1"), recorder.clone(), options());

        let mut rx = handle.subscribe();
        rx.wait_for(|s| !s.updates.is_empty()).await.unwrap();
        assert!(!handle.is_closed());

        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        // The aborted task released its handler
        assert_eq!(Arc::strong_count(&recorder.0), 1);
        assert_eq!(flow.stream_opens(), 1);
    }
}
