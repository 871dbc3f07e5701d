use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::models::job::JobKind;

/// Terminal outcome a sandbox job is scripted to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Partial,
    NoResults,
    Failed,
}

impl Outcome {
    /// Pick the outcome from marker words anywhere in the request: "fail",
    /// "empty" and "partial". Everything else completes.
    pub fn from_input(input: &Value) -> Self {
        let text = input.to_string().to_lowercase();
        if text.contains("fail") {
            Outcome::Failed
        } else if text.contains("empty") {
            Outcome::NoResults
        } else if text.contains("partial") {
            Outcome::Partial
        } else {
            Outcome::Completed
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxJob {
    pub id: String,
    pub kind: JobKind,
    pub input: Value,
    pub outcome: Outcome,
    pub polls: u32,
    /// Set once the step stream ran to completion; the next poll is terminal.
    pub stream_done: bool,
    /// Creation order, for eviction
    seq: u64,
}

impl SandboxJob {
    /// The terminal snapshot has been served at least once.
    fn is_settled(&self, scripted_polls: u32) -> bool {
        self.stream_done || self.polls > scripted_polls
    }
}

/// Reply to one status poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollReply {
    NotFound,
    NotReady,
    Snapshot(Value),
}

/// Shared in-memory state behind the sandbox routes.
#[derive(Clone)]
pub struct SandboxState {
    pub config: Arc<SandboxConfig>,
    jobs: Arc<Mutex<HashMap<String, SandboxJob>>>,
    sessions: Arc<Mutex<VecDeque<String>>>,
    refreshes: Arc<AtomicU64>,
    created: Arc<AtomicU64>,
}

impl SandboxState {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config: Arc::new(config),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            sessions: Arc::new(Mutex::new(VecDeque::new())),
            refreshes: Arc::new(AtomicU64::new(0)),
            created: Arc::new(AtomicU64::new(0)),
        }
    }

    pub async fn create(&self, kind: JobKind, input: Value) -> String {
        let id = Uuid::new_v4().to_string();
        let outcome = Outcome::from_input(&input);
        let job = SandboxJob {
            id: id.clone(),
            kind,
            input,
            outcome,
            polls: 0,
            stream_done: false,
            seq: self.created.fetch_add(1, Ordering::SeqCst),
        };
        {
            let mut jobs = self.jobs.lock().await;
            if jobs.len() >= self.config.max_jobs.max(1) {
                self.evict_one(&mut jobs);
            }
            jobs.insert(id.clone(), job);
        }

        metrics::counter!("sandbox_jobs_created_total", "kind" => kind.to_string()).increment(1);
        tracing::info!(job_id = %id, kind = %kind, outcome = ?outcome, "Sandbox job created");
        id
    }

    /// Drop the oldest finished job, or the oldest job when none has finished.
    fn evict_one(&self, jobs: &mut HashMap<String, SandboxJob>) {
        let scripted = self.config.warmup_not_found + self.config.processing_polls;
        let victim = jobs
            .values()
            .min_by_key(|job| (!job.is_settled(scripted), job.seq))
            .map(|job| job.id.clone());
        if let Some(id) = victim {
            jobs.remove(&id);
            metrics::counter!("sandbox_jobs_evicted_total").increment(1);
            tracing::debug!(job_id = %id, "Evicted sandbox job");
        }
    }

    /// Serve one poll, advancing the job one scripted step.
    ///
    /// A job answers `warmup_not_found` times with 404 (202 for reports),
    /// then `processing_polls` times with `processing`, then its terminal
    /// snapshot for good.
    pub async fn poll(&self, kind: JobKind, id: &str) -> PollReply {
        let mut jobs = self.jobs.lock().await;
        let job = match jobs.get_mut(id) {
            Some(job) if job.kind == kind => job,
            _ => return PollReply::NotFound,
        };
        job.polls += 1;
        metrics::counter!("sandbox_polls_total", "kind" => kind.to_string()).increment(1);

        let warmup = self.config.warmup_not_found;
        let processing = self.config.processing_polls;
        let served = job.polls - 1;

        if job.stream_done || served >= warmup + processing {
            return PollReply::Snapshot(terminal_snapshot(job));
        }
        if served < warmup {
            return if kind == JobKind::Report {
                PollReply::NotReady
            } else {
                PollReply::NotFound
            };
        }

        let step = served - warmup + 1;
        let percentage = f64::from(step) * 100.0 / f64::from(processing + 1);
        PollReply::Snapshot(json!({
            "status": "processing",
            "progress": {
                "percentage": percentage.round(),
                "stage": format!("step {} of {}", step, processing),
            },
        }))
    }

    pub async fn job(&self, id: &str) -> Option<SandboxJob> {
        self.jobs.lock().await.get(id).cloned()
    }

    pub async fn poll_count(&self, id: &str) -> Option<u32> {
        self.jobs.lock().await.get(id).map(|job| job.polls)
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn finish_stream(&self, id: &str) {
        if let Some(job) = self.jobs.lock().await.get_mut(id) {
            job.stream_done = true;
        }
    }

    pub async fn start_session(&self) -> String {
        let token = Uuid::new_v4().simple().to_string();
        {
            let mut sessions = self.sessions.lock().await;
            while sessions.len() >= self.config.max_sessions.max(1) {
                sessions.pop_front();
            }
            sessions.push_back(token.clone());
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        token
    }

    pub async fn has_session(&self, token: &str) -> bool {
        self.sessions.lock().await.iter().any(|known| known == token)
    }

    /// Number of `POST /api/auth/refresh` calls served.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn stream_step_delay(&self) -> Duration {
        Duration::from_millis(self.config.stream_step_delay_ms)
    }
}

/// Step names streamed for a C2PA verification.
pub const AUTHENTICITY_STEPS: [&str; 4] = [
    "fetching-manifest",
    "validating-signature",
    "checking-ai-markers",
    "compiling-report",
];

fn input_str<'a>(input: &'a Value, field: &str) -> Option<&'a str> {
    input.get(field).and_then(Value::as_str)
}

fn terminal_snapshot(job: &SandboxJob) -> Value {
    let status = match job.outcome {
        Outcome::Failed => {
            return json!({
                "status": "failed",
                "error": format!("{} failed in the sandbox", job.kind.label()),
            });
        }
        Outcome::NoResults => return json!({ "status": "no_results" }),
        Outcome::Partial => "partial",
        Outcome::Completed => "completed",
    };
    let partial = job.outcome == Outcome::Partial;
    let media_id = input_str(&job.input, "mediaId").unwrap_or("unknown");

    match job.kind {
        JobKind::Geolocation => json!({
            "status": status,
            "verification": {
                "match": true,
                "confidence": 87,
                "confidenceExplanation": "Skyline and signage match the claimed location",
                "discrepancies": [],
            },
            "mapData": { "lat": 48.8566, "lng": 2.3522 },
            "claimedLocation": input_str(&job.input, "claimedLocation"),
            "mediaId": media_id,
            "warnings": if partial { vec!["Street-level imagery was unavailable"] } else { vec![] },
        }),
        JobKind::ReverseLookup => json!({
            "status": status,
            "results": [
                {
                    "url": format!("https://news.example/{}", media_id),
                    "title": "Original report",
                    "source": "google",
                    "similarity": 97.5,
                    "firstSeen": "2024-03-02T08:15:00Z",
                },
                {
                    "url": format!("https://archive.example/{}", media_id),
                    "source": "bing",
                    "similarity": 91.0,
                },
            ],
            "failedEngines": if partial { vec!["tineye"] } else { vec![] },
        }),
        JobKind::SocialTrace => json!({
            "status": status,
            "platformAppearances": [
                {
                    "platform": "x",
                    "url": format!("https://x.example/post/{}", media_id),
                    "postedAt": "2024-03-01T21:40:00Z",
                    "author": "@first_poster",
                    "engagement": 1200,
                },
                {
                    "platform": "facebook",
                    "url": format!("https://facebook.example/{}", media_id),
                    "postedAt": "2024-03-02T06:05:00Z",
                },
            ],
            "distributionGraph": { "nodes": 2, "edges": 1 },
            "unavailablePlatforms": if partial { vec!["tiktok"] } else { vec![] },
        }),
        JobKind::Authenticity => json!({
            "status": status,
            "result": {
                "hasManifest": true,
                "signatureValid": true,
                "issuer": "Sandbox Camera Co.",
                "aiGenerated": false,
                "confidence": 92,
            },
            "warnings": if partial { vec!["Ingredient manifests could not be resolved"] } else { vec![] },
        }),
        JobKind::ClaimResearch => json!({
            "status": status,
            "verdict": "mostly true",
            "summary": "Multiple independent sources corroborate the core of the claim.",
            "findings": [
                { "statement": "Event confirmed by local authorities", "stance": "supports", "confidence": 0.9 },
            ],
            "sources": [
                { "url": "https://wire.example/story", "title": "Wire report" },
            ],
            "warnings": if partial { vec!["Paywalled sources were skipped"] } else { vec![] },
        }),
        JobKind::Report => {
            let format = input_str(&job.input, "format").unwrap_or("pdf");
            json!({
                "status": status,
                "downloadUrl": format!("/downloads/{}.{}", job.id, format),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(warmup_not_found: u32, processing_polls: u32) -> SandboxConfig {
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

    #[test]
    fn test_outcome_markers() {
        assert_eq!(Outcome::from_input(&json!({"mediaId": "fail-1"})), Outcome::Failed);
        assert_eq!(Outcome::from_input(&json!({"claim": "an EMPTY claim"})), Outcome::NoResults);
        assert_eq!(Outcome::from_input(&json!({"mediaId": "partial"})), Outcome::Partial);
        assert_eq!(
            Outcome::from_input(&json!({"claimedLocation": "Paris, France"})),
            Outcome::Completed
        );
    }

    #[tokio::test]
    async fn test_poll_script() {
        let state = SandboxState::new(config(1, 2));
        let id = state
            .create(JobKind::Geolocation, json!({"mediaId": "m1", "claimedLocation": "Paris"}))
            .await;

        assert_eq!(state.poll(JobKind::Geolocation, &id).await, PollReply::NotFound);
        for _ in 0..2 {
            match state.poll(JobKind::Geolocation, &id).await {
                PollReply::Snapshot(snapshot) => assert_eq!(snapshot["status"], "processing"),
                other => panic!("unexpected reply {:?}", other),
            }
        }
        match state.poll(JobKind::Geolocation, &id).await {
            PollReply::Snapshot(snapshot) => {
                assert_eq!(snapshot["status"], "completed");
                assert_eq!(snapshot["verification"]["confidence"], 87);
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(state.poll_count(&id).await, Some(4));
    }

    #[tokio::test]
    async fn test_wrong_kind_is_not_found() {
        let state = SandboxState::new(config(0, 0));
        let id = state.create(JobKind::Report, json!({"title": "t"})).await;
        assert_eq!(state.poll(JobKind::Geolocation, &id).await, PollReply::NotFound);
        assert!(matches!(state.poll(JobKind::Report, &id).await, PollReply::Snapshot(_)));
    }

    #[tokio::test]
    async fn test_report_warmup_is_not_ready() {
        let state = SandboxState::new(config(1, 0));
        let id = state.create(JobKind::Report, json!({"title": "t"})).await;
        assert_eq!(state.poll(JobKind::Report, &id).await, PollReply::NotReady);
    }

    #[tokio::test]
    async fn test_finished_stream_skips_processing() {
        let state = SandboxState::new(config(0, 5));
        let id = state.create(JobKind::Authenticity, json!({"mediaId": "m1"})).await;
        state.finish_stream(&id).await;
        match state.poll(JobKind::Authenticity, &id).await {
            PollReply::Snapshot(snapshot) => assert_eq!(snapshot["status"], "completed"),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_store_evicts_finished_jobs_first() {
        let mut config = config(0, 1);
        config.max_jobs = 2;
        let state = SandboxState::new(config);
        let input = || json!({"mediaId": "m1", "claimedLocation": "Paris"});

        let running = state.create(JobKind::Geolocation, input()).await;
        let finished = state.create(JobKind::Geolocation, input()).await;
        state.poll(JobKind::Geolocation, &finished).await;
        state.poll(JobKind::Geolocation, &finished).await;

        let newest = state.create(JobKind::Geolocation, input()).await;
        assert_eq!(state.job_count().await, 2);
        assert!(state.job(&finished).await.is_none());
        assert!(state.job(&running).await.is_some());

        // Nothing has finished now, so the oldest job goes.
        state.create(JobKind::Geolocation, input()).await;
        assert_eq!(state.job_count().await, 2);
        assert!(state.job(&running).await.is_none());
        assert!(state.job(&newest).await.is_some());
    }

    #[tokio::test]
    async fn test_sessions_are_capped() {
        let mut config = config(0, 0);
        config.max_sessions = 2;
        let state = SandboxState::new(config);

        let first = state.start_session().await;
        let second = state.start_session().await;
        let third = state.start_session().await;

        assert!(!state.has_session(&first).await);
        assert!(state.has_session(&second).await);
        assert!(state.has_session(&third).await);
        assert_eq!(state.refresh_count(), 3);
    }
}
