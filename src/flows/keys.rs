//! Job identifiers and their query-string form.
//!
//! A results view must survive a page reload, so every key can be written to
//! and read back from the query parameters the dashboard uses (`jobId`,
//! `verificationId`, `mediaId`, `traceId`).

use std::collections::HashMap;
use std::fmt;
use url::form_urlencoded;

pub trait JobKey: Clone + fmt::Display + fmt::Debug + Send + Sync + 'static {
    fn query_pairs(&self) -> Vec<(&'static str, String)>;

    /// Rebuild the key from a query string; `None` when a parameter is missing.
    fn from_query(query: &str) -> Option<Self>;

    fn to_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query_pairs())
            .finish()
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .into_owned()
        .filter(|(_, value)| !value.is_empty())
        .collect()
}

/// Plain `jobId` key (reverse lookup, claim research, reports).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobRef {
    pub job_id: String,
}

impl JobRef {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.job_id)
    }
}

impl JobKey for JobRef {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![("jobId", self.job_id.clone())]
    }

    fn from_query(query: &str) -> Option<Self> {
        let mut params = parse_query(query);
        params.remove("jobId").map(JobRef::new)
    }
}

/// `verificationId` key, optionally carrying the media it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerificationRef {
    pub verification_id: String,
    pub media_id: Option<String>,
}

impl fmt::Display for VerificationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.verification_id)
    }
}

impl JobKey for VerificationRef {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("verificationId", self.verification_id.clone())];
        if let Some(media_id) = &self.media_id {
            pairs.push(("mediaId", media_id.clone()));
        }
        pairs
    }

    fn from_query(query: &str) -> Option<Self> {
        let mut params = parse_query(query);
        Some(Self {
            verification_id: params.remove("verificationId")?,
            media_id: params.remove("mediaId"),
        })
    }
}

/// Social-media traces are addressed by media and trace id together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceRef {
    pub media_id: String,
    pub trace_id: String,
}

impl fmt::Display for TraceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.media_id, self.trace_id)
    }
}

impl JobKey for TraceRef {
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("mediaId", self.media_id.clone()),
            ("traceId", self.trace_id.clone()),
        ]
    }

    fn from_query(query: &str) -> Option<Self> {
        let mut params = parse_query(query);
        Some(Self {
            media_id: params.remove("mediaId")?,
            trace_id: params.remove("traceId")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_ref_requires_both_ids() {
        assert!(TraceRef::from_query("mediaId=m1").is_none());
        let key = TraceRef::from_query("?mediaId=m1&traceId=t%2F9").unwrap();
        assert_eq!(key.trace_id, "t/9");
        assert_eq!(key.to_query(), "mediaId=m1&traceId=t%2F9");
    }

    #[test]
    fn test_empty_param_counts_as_missing() {
        assert!(JobRef::from_query("jobId=").is_none());
    }

    #[test]
    fn test_verification_ref_media_is_optional() {
        let key = VerificationRef::from_query("verificationId=v1").unwrap();
        assert_eq!(key.media_id, None);
        assert_eq!(key.to_query(), "verificationId=v1");
    }
}
