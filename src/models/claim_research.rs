use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::not_blank;
use crate::tracking::view::ResultSummary;

/// Request to research a factual claim against public sources.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResearchRequest {
    #[garde(custom(not_blank), length(min = 10, max = 2000))]
    pub claim: String,

    #[garde(length(max = 4000))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[garde(length(min = 1, max = 200))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub statement: String,
    /// "supports", "refutes" or "neutral"
    #[serde(default)]
    pub stance: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResearchResult {
    #[serde(default)]
    pub verdict: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl ResultSummary for ClaimResearchResult {
    fn headline(&self) -> String {
        match &self.verdict {
            Some(verdict) => format!("Verdict: {}", verdict),
            None => "Research complete".to_string(),
        }
    }

    fn details(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.summary.iter().cloned().collect();
        lines.extend(self.findings.iter().map(|f| match &f.stance {
            Some(stance) => format!("[{}] {}", stance, f.statement),
            None => f.statement.clone(),
        }));
        lines.extend(self.sources.iter().map(|s| {
            format!("Source: {}", s.title.as_deref().unwrap_or(s.url.as_str()))
        }));
        lines
    }
}
