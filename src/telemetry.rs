use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

/// Install JSON structured logging, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .with_writer(std::io::stderr)
        .init();
}

/// Register descriptions for the tracker's metrics.
pub fn describe_tracker_metrics() {
    metrics::describe_counter!("tracker_jobs_submitted_total", "Jobs accepted by the backend");
    metrics::describe_counter!("tracker_submit_errors_total", "Job submissions rejected or failed");
    metrics::describe_counter!("tracker_polls_total", "Status fetches issued");
    metrics::describe_counter!("tracker_poll_errors_total", "Status fetches that failed");
    metrics::describe_counter!(
        "tracker_jobs_finished_total",
        "Tracked jobs that reached a terminal state, by outcome"
    );
    metrics::describe_counter!(
        "tracker_stale_warnings_total",
        "Jobs flagged as processing for longer than expected"
    );
    metrics::describe_counter!("tracker_stream_reconnects_total", "Step stream reconnect attempts");
    metrics::describe_gauge!("tracker_active_sessions", "Jobs currently being tracked");
    metrics::describe_histogram!(
        "tracker_job_duration_seconds",
        "Time from tracking start to terminal state"
    );
}

/// Serve tracker metrics for scraping at `addr`.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_tracker_metrics();
    Ok(())
}

/// Install an in-process recorder and return the handle used to render `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}
