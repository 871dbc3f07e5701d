use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::not_blank;
use crate::tracking::view::ResultSummary;

/// Request to verify C2PA content credentials and run AI-generation detection.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticityRequest {
    #[garde(custom(not_blank), length(max = 200))]
    pub media_id: String,

    #[garde(skip)]
    pub deep_scan: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticityResult {
    #[serde(default)]
    pub has_manifest: bool,
    #[serde(default)]
    pub signature_valid: Option<bool>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub ai_generated: Option<bool>,
    /// 0-100
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub manifest: Option<serde_json::Value>,
}

impl ResultSummary for AuthenticityResult {
    fn headline(&self) -> String {
        match (self.has_manifest, self.signature_valid) {
            (false, _) => "No Content Credentials Found".to_string(),
            (true, Some(false)) => "Content Credentials Invalid".to_string(),
            (true, _) => "Content Credentials Verified".to_string(),
        }
    }

    fn details(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(issuer) = &self.issuer {
            lines.push(format!("Signed by: {}", issuer));
        }
        match (self.ai_generated, self.confidence) {
            (Some(true), Some(c)) => lines.push(format!("Likely AI-generated ({:.0}% confidence)", c)),
            (Some(false), Some(c)) => lines.push(format!("No AI generation detected ({:.0}% confidence)", c)),
            (Some(true), None) => lines.push("Likely AI-generated".to_string()),
            (Some(false), None) => lines.push("No AI generation detected".to_string()),
            (None, _) => {}
        }
        lines
    }
}
