use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One incremental step reported on a job's live stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepUpdate {
    pub step: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl StepUpdate {
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }
}

/// Decoded event on a step stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Step(StepUpdate),
    Complete,
    /// The backend reported an error for the job on the stream.
    Failed(String),
}
