use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;

use crate::models::job::JobKind;
use crate::sandbox::routes::SandboxError;
use crate::sandbox::state::{Outcome, AUTHENTICITY_STEPS};
use crate::sandbox::SandboxState;

enum Frame {
    Step(usize, &'static str),
    Complete,
    Error(String),
}

/// GET /api/c2pa/verify/{id}/stream: live verification steps as SSE.
///
/// Emits one `step` event per stage, then `complete` (or `error` for jobs
/// scripted to fail). A completed stream makes the next poll terminal.
pub async fn authenticity_steps(
    State(state): State<SandboxState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, SandboxError> {
    let job = match state.job(&id).await {
        Some(job) if job.kind == JobKind::Authenticity => job,
        _ => return Err(SandboxError::NotFound),
    };

    let mut frames: Vec<Frame> = AUTHENTICITY_STEPS
        .iter()
        .enumerate()
        .map(|(index, step)| Frame::Step(index, *step))
        .collect();
    frames.push(match job.outcome {
        Outcome::Failed => Frame::Error("Manifest signature could not be validated".to_string()),
        _ => Frame::Complete,
    });

    tracing::debug!(job_id = %id, "Streaming authenticity steps");
    let delay = state.stream_step_delay();

    let events = stream::iter(frames).then(move |frame| {
        let state = state.clone();
        let id = id.clone();
        async move {
            tokio::time::sleep(delay).await;
            match frame {
                Frame::Step(index, step) => Event::default().event("step").json_data(json!({
                    "step": step,
                    "timestamp": Utc::now(),
                    "payload": { "index": index, "total": AUTHENTICITY_STEPS.len() },
                })),
                Frame::Complete => {
                    state.finish_stream(&id).await;
                    Ok(Event::default().event("complete").data("{}"))
                }
                Frame::Error(message) => Event::default()
                    .event("error")
                    .json_data(json!({ "message": message })),
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
