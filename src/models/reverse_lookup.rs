use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::not_blank;
use crate::tracking::view::ResultSummary;

/// Request to find earlier appearances of a media item on the web.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReverseLookupRequest {
    #[garde(custom(not_blank), length(max = 200))]
    pub media_id: String,

    /// Search engines to query; empty means the backend default set.
    #[garde(length(max = 10))]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub engines: Vec<String>,

    #[garde(range(min = 1, max = 500))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupMatch {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// 0-100
    #[serde(default)]
    pub similarity: Option<f64>,
    #[serde(default)]
    pub first_seen: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseLookupResult {
    pub matches: Vec<LookupMatch>,
}

impl ResultSummary for ReverseLookupResult {
    fn headline(&self) -> String {
        match self.matches.len() {
            1 => "1 match found".to_string(),
            n => format!("{} matches found", n),
        }
    }

    fn details(&self) -> Vec<String> {
        self.matches
            .iter()
            .map(|m| match m.similarity {
                Some(similarity) => format!("{:.0}% {}", similarity, m.url),
                None => m.url.clone(),
            })
            .collect()
    }
}
