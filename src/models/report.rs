use garde::Validate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::tracking::view::ResultSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReportFormat {
    Pdf,
    Html,
    Json,
}

/// Request to compile verification results into a downloadable report.
#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[garde(length(min = 1, max = 200))]
    pub title: String,

    #[garde(length(min = 1, max = 50), inner(length(min = 1, max = 200)))]
    pub media_ids: Vec<String>,

    #[garde(skip)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResult {
    #[serde(default)]
    pub download_url: Option<String>,
}

impl ResultSummary for ReportResult {
    fn headline(&self) -> String {
        "Report ready".to_string()
    }

    fn details(&self) -> Vec<String> {
        match &self.download_url {
            Some(url) => vec![format!("Download: {}", url)],
            None => vec!["The download link will be emailed to you.".to_string()],
        }
    }
}
