//! Test helpers: an in-process sandbox backend and fast tracker options

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use safeguard_tracker::config::SandboxConfig;
use safeguard_tracker::sandbox::{self, SandboxState};
use safeguard_tracker::services::api::ApiClient;
use safeguard_tracker::tracking::{JobTracker, TrackerEvent, TrackerOptions};

/// A sandbox served on an ephemeral localhost port.
pub struct TestBackend {
    pub state: SandboxState,
    pub base_url: String,
}

impl TestBackend {
    pub async fn start(config: SandboxConfig) -> Self {
        let state = SandboxState::new(config);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("No local address");

        let app = sandbox::router(state.clone(), None);
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Sandbox server failed");
        });

        Self {
            state,
            base_url: format!("http://{}", addr),
        }
    }

    pub fn api(&self) -> Arc<ApiClient> {
        Arc::new(ApiClient::new(&self.base_url, Duration::from_secs(5)).expect("Failed to build client"))
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub fn sandbox_config(warmup_not_found: u32, processing_polls: u32) -> SandboxConfig {
    SandboxConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        warmup_not_found,
        processing_polls,
        stream_step_delay_ms: 10,
        require_session: false,
        max_jobs: 100,
        max_sessions: 10,
    }
}

/// Millisecond cadence so a full job runs in well under a second.
pub fn fast_options() -> TrackerOptions {
    let mut options = TrackerOptions::default();
    options.poll.interval = Some(Duration::from_millis(40));
    options.poll.warmup_delay = Duration::from_millis(10);
    options
}

/// Every event up to and including `Finished`, bounded by `timeout`.
pub async fn collect_events<R>(tracker: &mut JobTracker<R>, timeout: Duration) -> Vec<TrackerEvent<R>>
where
    R: Clone + Send + Sync + 'static,
{
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match tokio::time::timeout_at(deadline, tracker.next_event()).await {
            Ok(Some(event)) => {
                let finished = matches!(event, TrackerEvent::Finished(_));
                events.push(event);
                if finished {
                    return events;
                }
            }
            Ok(None) => return events,
            Err(_) => panic!("Tracker did not finish within {:?}", timeout),
        }
    }
}
