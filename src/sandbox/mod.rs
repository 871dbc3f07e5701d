//! In-memory stand-in for the verification backend.
//!
//! Serves every job route the flows talk to, advancing each job one scripted
//! step per poll. Used by the `sandbox` binary for local runs and by the
//! HTTP integration tests.

pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use state::{Outcome, PollReply, SandboxState};

/// Build the sandbox router. `/metrics` is mounted only when a handle is given.
pub fn router(state: SandboxState, metrics: Option<Arc<PrometheusHandle>>) -> Router {
    let jobs = Router::new()
        .route("/api/geo/verify", post(routes::jobs::submit_geolocation))
        .route("/api/geo/verify/{id}", get(routes::jobs::get_geolocation))
        .route("/api/reverse-lookup", post(routes::jobs::submit_reverse_lookup))
        .route("/api/reverse-lookup/{id}", get(routes::jobs::get_reverse_lookup))
        .route(
            "/api/sm-tracing/media/{media_id}/trace",
            post(routes::jobs::submit_trace),
        )
        .route(
            "/api/sm-tracing/media/{media_id}/trace/{id}",
            get(routes::jobs::get_trace),
        )
        .route("/api/c2pa/verify", post(routes::jobs::submit_authenticity))
        .route("/api/c2pa/verify/{id}", get(routes::jobs::get_authenticity))
        .route("/api/c2pa/verify/{id}/stream", get(routes::stream::authenticity_steps))
        .route("/api/claim-research", post(routes::jobs::submit_claim_research))
        .route("/api/claim-research/{id}", get(routes::jobs::get_claim_research))
        .route("/api/reports", post(routes::jobs::submit_report))
        .route("/api/reports/{id}", get(routes::jobs::get_report))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            routes::auth::require_session,
        ));

    let mut app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/auth/refresh", post(routes::auth::refresh))
        .merge(jobs)
        .with_state(state);

    if let Some(handle) = metrics {
        app = app.route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(handle),
        );
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1 MB limit
}
