use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::not_blank;
use crate::tracking::view::ResultSummary;

/// Request to verify that media was captured where it claims to be.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationRequest {
    #[garde(custom(not_blank), length(max = 200))]
    pub media_id: String,

    /// Free-text location, e.g. "Paris, France"
    #[garde(custom(not_blank), length(max = 500))]
    pub claimed_location: String,
}

/// Verdict of a geolocation check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationVerification {
    #[serde(rename = "match")]
    pub is_match: bool,
    /// 0-100
    pub confidence: f64,
    #[serde(default)]
    pub confidence_explanation: Option<String>,
    #[serde(default)]
    pub discrepancies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationResult {
    pub verification: LocationVerification,
    #[serde(default)]
    pub map_data: Option<serde_json::Value>,
    #[serde(default)]
    pub claimed_location: Option<String>,
    #[serde(default)]
    pub media_id: Option<String>,
}

impl ResultSummary for GeolocationResult {
    fn headline(&self) -> String {
        if self.verification.is_match {
            "Location Verified".to_string()
        } else {
            "Location Not Verified".to_string()
        }
    }

    fn details(&self) -> Vec<String> {
        let mut lines = vec![format!("Confidence: {:.0}%", self.verification.confidence)];
        if let Some(location) = &self.claimed_location {
            lines.push(format!("Claimed location: {}", location));
        }
        if let Some(explanation) = &self.verification.confidence_explanation {
            lines.push(explanation.clone());
        }
        lines.extend(
            self.verification
                .discrepancies
                .iter()
                .map(|d| format!("Discrepancy: {}", d)),
        );
        lines
    }
}
