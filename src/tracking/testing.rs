//! In-memory flow with scripted replies, for driving the tracking machinery
//! under paused tokio time.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use garde::Validate;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::error::{ApiError, StreamError};
use crate::flows::{JobFlow, JobRef, Submission};
use crate::models::job::{Job, JobKind, JobStatus};
use crate::models::step::{StepUpdate, StreamEvent};
use crate::services::api::FetchOutcome;
use crate::services::sse::StepStream;
use crate::tracking::view::ResultSummary;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Verdict(pub String);

impl ResultSummary for Verdict {
    fn headline(&self) -> String {
        self.0.clone()
    }
}

pub(crate) fn done(text: &str) -> Reply<Verdict> {
    Reply::Done(Verdict(text.to_string()))
}

#[derive(Debug, Serialize, Validate)]
pub(crate) struct ScriptRequest {
    #[garde(length(min = 1))]
    pub name: String,
}

#[derive(Debug, Clone)]
pub(crate) enum Reply<R> {
    Status(JobStatus),
    Done(R),
    Failed(Option<&'static str>),
    NotReady,
    NotFound,
    /// 503, retried on the next tick
    Error,
    /// Session refresh failed
    Unauthorized,
}

#[derive(Debug, Clone)]
pub(crate) enum StreamItem {
    Step(&'static str),
    Complete,
    Failed(&'static str),
    /// Keep the connection open without further events
    Hang,
}

pub(crate) struct ScriptedFlow<R> {
    kind: JobKind,
    replies: Mutex<VecDeque<Reply<R>>>,
    last: Mutex<Option<Reply<R>>>,
    calls: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
    streams: Mutex<VecDeque<Vec<StreamItem>>>,
    stream_opens: AtomicUsize,
}

impl ScriptedFlow<Verdict> {
    pub(crate) fn new(replies: Vec<Reply<Verdict>>) -> Arc<Self> {
        Self::typed(JobKind::Geolocation, replies, Vec::new())
    }

    pub(crate) fn streaming(replies: Vec<Reply<Verdict>>, streams: Vec<Vec<StreamItem>>) -> Arc<Self> {
        Self::typed(JobKind::Authenticity, replies, streams)
    }
}

impl<R> ScriptedFlow<R> {
    pub(crate) fn typed(kind: JobKind, replies: Vec<Reply<R>>, streams: Vec<Vec<StreamItem>>) -> Arc<Self> {
        Arc::new(Self {
            kind,
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            gate: Mutex::new(None),
            streams: Mutex::new(streams.into()),
            stream_opens: AtomicUsize::new(0),
        })
    }

    /// Number of fetches started so far.
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn stream_opens(&self) -> usize {
        self.stream_opens.load(Ordering::SeqCst)
    }

    /// Make every fetch wait for a permit on the returned semaphore.
    pub(crate) fn hold_fetches(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }
}

impl<R: Clone> ScriptedFlow<R> {
    /// Next scripted reply; the last one repeats once the script runs out.
    fn next_reply(&self) -> Reply<R> {
        let mut last = self.last.lock().unwrap();
        if let Some(reply) = self.replies.lock().unwrap().pop_front() {
            *last = Some(reply);
        }
        last.clone().unwrap_or(Reply::NotFound)
    }
}

#[async_trait]
impl<R> JobFlow for ScriptedFlow<R>
where
    R: ResultSummary + Clone + Send + Sync + 'static,
{
    type Request = ScriptRequest;
    type Key = JobRef;
    type Output = R;

    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn create(&self, request: &ScriptRequest) -> Result<Submission<JobRef>, ApiError> {
        Ok(Submission::new(
            JobRef::new(format!("job-{}", request.name)),
            None,
            None,
        ))
    }

    async fn fetch(&self, key: &JobRef) -> Result<FetchOutcome<Job<R>>, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let snapshot = |status, result, error: Option<&str>| {
            Job::from_parts(
                key.job_id.clone(),
                self.kind,
                status,
                None,
                result,
                error.map(str::to_string),
            )
        };
        match self.next_reply() {
            Reply::Status(status) => Ok(FetchOutcome::Ready(snapshot(status, None, None))),
            Reply::Done(result) => Ok(FetchOutcome::Ready(snapshot(JobStatus::Completed, Some(result), None))),
            Reply::Failed(message) => Ok(FetchOutcome::Ready(snapshot(JobStatus::Failed, None, message))),
            Reply::NotReady => Ok(FetchOutcome::NotReady),
            Reply::NotFound => Ok(FetchOutcome::NotFound),
            Reply::Error => Err(ApiError::Status {
                status: 503,
                message: Some("upstream unavailable".to_string()),
            }),
            Reply::Unauthorized => Err(ApiError::Unauthorized),
        }
    }

    async fn open_stream(&self, _key: &JobRef) -> Result<Option<StepStream>, ApiError> {
        self.stream_opens.fetch_add(1, Ordering::SeqCst);
        let items = match self.streams.lock().unwrap().pop_front() {
            Some(items) => items,
            None => return Ok(None),
        };

        let hang = matches!(items.last(), Some(StreamItem::Hang));
        let events: Vec<Result<StreamEvent, StreamError>> = items
            .into_iter()
            .filter_map(|item| match item {
                StreamItem::Step(step) => Some(Ok(StreamEvent::Step(StepUpdate::new(step)))),
                StreamItem::Complete => Some(Ok(StreamEvent::Complete)),
                StreamItem::Failed(message) => Some(Ok(StreamEvent::Failed(message.to_string()))),
                StreamItem::Hang => None,
            })
            .collect();

        let events = stream::iter(events);
        let stream = if hang {
            events.chain(stream::pending()).boxed()
        } else {
            events.boxed()
        };
        Ok(Some(stream))
    }

    fn supports_streaming(&self) -> bool {
        self.kind == JobKind::Authenticity
    }
}
