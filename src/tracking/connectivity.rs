use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::services::api::ApiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

/// Publishes online/offline transitions on a `watch` channel.
///
/// [`ConnectivityMonitor::probe`] derives them from the backend health
/// endpoint; [`ConnectivityMonitor::manual`] leaves them to the embedding
/// application.
pub struct ConnectivityMonitor {
    tx: watch::Sender<Connectivity>,
    probe: Option<JoinHandle<()>>,
}

impl ConnectivityMonitor {
    pub fn manual() -> Self {
        let (tx, _) = watch::channel(Connectivity::Online);
        Self { tx, probe: None }
    }

    /// Probe `GET /health` every `interval` and publish transitions only.
    pub fn probe(api: Arc<ApiClient>, interval: Duration) -> Self {
        let (tx, _) = watch::channel(Connectivity::Online);
        let probe_tx = tx.clone();

        let probe = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let next = if api.is_reachable().await {
                    Connectivity::Online
                } else {
                    Connectivity::Offline
                };
                if publish(&probe_tx, next) {
                    tracing::info!(connectivity = %next, "Backend connectivity changed");
                }
            }
        });

        Self {
            tx,
            probe: Some(probe),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    /// Report a state change. Returns `true` if it was a transition.
    pub fn set(&self, connectivity: Connectivity) -> bool {
        publish(&self.tx, connectivity)
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        if let Some(probe) = self.probe.take() {
            probe.abort();
        }
    }
}

fn publish(tx: &watch::Sender<Connectivity>, next: Connectivity) -> bool {
    tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    })
}
