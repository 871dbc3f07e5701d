use garde::Validate;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::ApiError;
use crate::flows::{JobFlow, Submission};
use crate::models::job::Job;
use crate::tracking::connectivity::Connectivity;
use crate::tracking::tracker::{JobTracker, TrackerOptions};

/// Validate `request` and create the job. Nothing goes over the network when
/// validation fails.
pub async fn submit<F: JobFlow>(flow: &F, request: &F::Request) -> Result<Submission<F::Key>, ApiError> {
    let kind = flow.kind();
    if let Err(report) = request.validate() {
        tracing::debug!(kind = %kind, error = %report, "Rejected invalid job request");
        return Err(ApiError::Validation(report));
    }

    match flow.create(request).await {
        Ok(submission) => {
            metrics::counter!("tracker_jobs_submitted_total", "kind" => kind.to_string()).increment(1);
            tracing::info!(
                job_id = %submission.key,
                kind = %kind,
                status = %submission.status,
                estimated_time = ?submission.estimated_time,
                "Job submitted"
            );
            Ok(submission)
        }
        Err(e) => {
            metrics::counter!("tracker_submit_errors_total", "kind" => kind.to_string()).increment(1);
            tracing::warn!(kind = %kind, error = %e, "Job submission failed");
            Err(e)
        }
    }
}

/// Submit a job and start tracking it from its initial `queued`/`pending` state.
pub async fn submit_and_track<F: JobFlow>(
    flow: Arc<F>,
    request: &F::Request,
    options: TrackerOptions,
    connectivity: watch::Receiver<Connectivity>,
) -> Result<(Submission<F::Key>, JobTracker<F::Output>), ApiError> {
    let submission = submit(flow.as_ref(), request).await?;

    let mut initial = Job::queued(submission.key.to_string(), flow.kind());
    initial.status = submission.status;

    let tracker = JobTracker::start_with(flow, submission.key.clone(), options, connectivity, Some(initial));
    Ok((submission, tracker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobStatus;
    use crate::tracking::connectivity::ConnectivityMonitor;
    use crate::tracking::testing::{done, Reply, ScriptRequest, ScriptedFlow};
    use crate::tracking::tracker::TrackerEvent;
    use crate::tracking::view::JobView;

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_never_reaches_backend() {
        let flow = ScriptedFlow::new(vec![done("found")]);
        let connectivity = ConnectivityMonitor::manual();
        let request = ScriptRequest { name: String::new() };

        let result = submit_and_track(flow.clone(), &request, TrackerOptions::default(), connectivity.subscribe()).await;
        match result {
            Err(ApiError::Validation(_)) => {}
            Err(other) => panic!("unexpected error {}", other),
            Ok(_) => panic!("invalid request was accepted"),
        }

        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        assert_eq!(flow.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_view_is_emitted_before_first_poll() {
        let flow = ScriptedFlow::new(vec![Reply::Status(JobStatus::Processing), done("found")]);
        let connectivity = ConnectivityMonitor::manual();
        let request = ScriptRequest {
            name: "m1".to_string(),
        };

        let (submission, mut tracker) =
            submit_and_track(flow.clone(), &request, TrackerOptions::default(), connectivity.subscribe())
                .await
                .unwrap();
        assert_eq!(submission.key.job_id, "job-m1");
        assert_eq!(submission.status, JobStatus::Queued);

        match tracker.try_next_event() {
            Some(TrackerEvent::View(JobView::InProgress { status, .. })) => assert_eq!(status, JobStatus::Queued),
            other => panic!("unexpected first event {:?}", other.map(|e| e.name())),
        }
        assert_eq!(flow.calls(), 0);

        let finished = tracker.wait().await;
        assert!(matches!(finished, Some(JobView::Results { .. })));
    }
}
