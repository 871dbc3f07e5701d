use serde::Deserialize;
use std::time::Duration;

use crate::error::ConfigError;

/// Tracker configuration, read from `SGM_`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Verification backend base URL (e.g., "https://api.safeguardmedia.io")
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Delay between settled status fetches. Each flow has its own default.
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// First retry delay after a warm-up 404, doubled per consecutive 404
    #[serde(default = "default_warmup_delay_ms")]
    pub warmup_delay_ms: u64,

    /// Consecutive 404s tolerated before a job is reported as not found
    #[serde(default = "default_not_found_budget")]
    pub not_found_budget: u32,

    /// Elapsed processing time after which a job is flagged as stale
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    #[serde(default = "default_stale_check_interval_secs")]
    pub stale_check_interval_secs: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Interval between backend reachability probes
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    #[serde(default = "default_stream_reconnect_attempts")]
    pub stream_reconnect_attempts: u32,

    /// Prometheus exporter listen address (e.g., "127.0.0.1:9100"). Disabled when unset.
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

fn default_api_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_warmup_delay_ms() -> u64 {
    2_000
}

fn default_not_found_budget() -> u32 {
    5
}

fn default_stale_after_secs() -> u64 {
    600
}

fn default_stale_check_interval_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_probe_interval_secs() -> u64 {
    5
}

fn default_stream_reconnect_attempts() -> u32 {
    3
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            poll_interval_ms: None,
            warmup_delay_ms: default_warmup_delay_ms(),
            not_found_budget: default_not_found_budget(),
            stale_after_secs: default_stale_after_secs(),
            stale_check_interval_secs: default_stale_check_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            probe_interval_secs: default_probe_interval_secs(),
            stream_reconnect_attempts: default_stream_reconnect_attempts(),
            metrics_addr: None,
        }
    }
}

impl TrackerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::prefixed("SGM_").from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.api_base_url)
            .map_err(|e| ConfigError::Invalid(format!("SGM_API_BASE_URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "SGM_API_BASE_URL must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.poll_interval_ms == Some(0) {
            return Err(ConfigError::Invalid("SGM_POLL_INTERVAL_MS must be positive".to_string()));
        }
        if self.stale_check_interval_secs == 0 || self.probe_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "check and probe intervals must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn warmup_delay(&self) -> Duration {
        Duration::from_millis(self.warmup_delay_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn stale_check_interval(&self) -> Duration {
        Duration::from_secs(self.stale_check_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

/// Sandbox backend configuration, read from `SANDBOX_`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxConfig {
    /// Server bind address (e.g., "127.0.0.1:3000")
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Number of 404 responses served before a new job becomes visible
    #[serde(default = "default_warmup_not_found")]
    pub warmup_not_found: u32,

    /// Number of `processing` snapshots served before the terminal one
    #[serde(default = "default_processing_polls")]
    pub processing_polls: u32,

    /// Delay between events on the C2PA step stream
    #[serde(default = "default_stream_step_delay_ms")]
    pub stream_step_delay_ms: u64,

    /// Reject job routes without a session cookie until `/api/auth/refresh` is called
    #[serde(default)]
    pub require_session: bool,

    /// Jobs kept in memory; finished jobs are evicted first, oldest first
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    /// Session tokens kept in memory; the oldest is dropped past the cap
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_warmup_not_found() -> u32 {
    1
}

fn default_processing_polls() -> u32 {
    3
}

fn default_stream_step_delay_ms() -> u64 {
    750
}

fn default_max_jobs() -> usize {
    1000
}

fn default_max_sessions() -> usize {
    100
}

impl SandboxConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::prefixed("SANDBOX_").from_env()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_dashboard_timings() {
        let config = TrackerConfig::default();
        assert_eq!(config.poll_interval(), None);
        assert_eq!(config.stale_after(), Duration::from_secs(600));
        assert_eq!(config.stale_check_interval(), Duration::from_secs(30));
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn test_prefixed_env_overrides() {
        let vars = vec![
            ("SGM_API_BASE_URL".to_string(), "https://api.example.test".to_string()),
            ("SGM_POLL_INTERVAL_MS".to_string(), "250".to_string()),
            ("SGM_NOT_FOUND_BUDGET".to_string(), "2".to_string()),
        ];
        let config: TrackerConfig = envy::prefixed("SGM_").from_iter(vars).unwrap();
        assert_eq!(config.api_base_url, "https://api.example.test");
        assert_eq!(config.poll_interval(), Some(Duration::from_millis(250)));
        assert_eq!(config.not_found_budget, 2);
        assert_eq!(config.stale_after_secs, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = TrackerConfig {
            api_base_url: "ftp://example.test".to_string(),
            ..TrackerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = TrackerConfig {
            stale_check_interval_secs: 0,
            ..TrackerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
