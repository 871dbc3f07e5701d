use safeguard_tracker::config::SandboxConfig;
use safeguard_tracker::sandbox::{self, SandboxState};
use safeguard_tracker::telemetry;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    let config = SandboxConfig::from_env()?;
    tracing::info!(
        warmup_not_found = config.warmup_not_found,
        processing_polls = config.processing_polls,
        require_session = config.require_session,
        "Initializing verification sandbox"
    );

    // Prometheus recorder, rendered at /metrics
    let prometheus_handle = Arc::new(telemetry::install_recorder()?);
    metrics::describe_counter!("sandbox_jobs_created_total", "Jobs created in the sandbox");
    metrics::describe_counter!("sandbox_polls_total", "Status polls served by the sandbox");

    let bind_addr = config.bind_addr.clone();
    let app = sandbox::router(SandboxState::new(config), Some(prometheus_handle));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Sandbox listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
