use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::not_blank;
use crate::tracking::view::ResultSummary;

/// Request to trace how a media item spread across social platforms.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TraceRequest {
    /// Sent as a path segment, not in the body
    #[garde(custom(not_blank), length(max = 200))]
    #[serde(skip)]
    pub media_id: String,

    #[garde(length(max = 20))]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,

    #[garde(range(min = 1, max = 5))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_depth: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformAppearance {
    pub platform: String,
    pub url: String,
    #[serde(default)]
    pub posted_at: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub engagement: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    pub platform_appearances: Vec<PlatformAppearance>,
    #[serde(default)]
    pub distribution_graph: Option<serde_json::Value>,
    #[serde(default)]
    pub forensic_analysis: Option<serde_json::Value>,
}

impl TraceResult {
    /// Earliest appearance by posting time, as reported by the backend.
    pub fn earliest(&self) -> Option<&PlatformAppearance> {
        self.platform_appearances
            .iter()
            .filter(|a| a.posted_at.is_some())
            .min_by(|a, b| a.posted_at.cmp(&b.posted_at))
    }
}

impl ResultSummary for TraceResult {
    fn headline(&self) -> String {
        let mut platforms: Vec<&str> = self
            .platform_appearances
            .iter()
            .map(|a| a.platform.as_str())
            .collect();
        platforms.sort_unstable();
        platforms.dedup();
        format!(
            "{} appearances across {} platforms",
            self.platform_appearances.len(),
            platforms.len()
        )
    }

    fn details(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(first) = self.earliest() {
            lines.push(format!(
                "Earliest: {} on {} ({})",
                first.url,
                first.platform,
                first.posted_at.as_deref().unwrap_or("unknown date")
            ));
        }
        lines.extend(
            self.platform_appearances
                .iter()
                .map(|a| format!("{}: {}", a.platform, a.url)),
        );
        lines
    }
}
