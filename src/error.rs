use reqwest::StatusCode;

/// Generic message shown when the backend gives no usable explanation.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Errors raised while talking to the verification backend.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {}", message.as_deref().unwrap_or("no message"))]
    Status {
        status: u16,
        message: Option<String>,
    },

    #[error("Session expired and token refresh failed")]
    Unauthorized,

    #[error("Failed to parse backend response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    Validation(#[from] garde::Report),

    #[error("Invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid path segment: {0:?}")]
    InvalidSegment(String),
}

impl ApiError {
    /// Whether a single failed poll should simply be retried on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Http(_) | ApiError::Parse(_) => true,
            ApiError::Status { status, .. } => {
                *status >= 500
                    || *status == StatusCode::REQUEST_TIMEOUT.as_u16()
                    || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            ApiError::Unauthorized
            | ApiError::Validation(_)
            | ApiError::InvalidUrl(_)
            | ApiError::InvalidSegment(_) => false,
        }
    }

    /// Message suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            ApiError::Validation(report) => format!("Please check the request: {}", report),
            ApiError::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Errors raised by a step stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Failed to open step stream: {0}")]
    Open(#[from] ApiError),

    #[error("Step stream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed step event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Backend reported a stream error: {0}")]
    Remote(String),

    #[error("Step stream closed by the backend")]
    Closed,
}

impl StreamError {
    /// Remote errors are authoritative; everything else is worth a reconnect.
    pub fn is_reconnectable(&self) -> bool {
        !matches!(self, StreamError::Remote(_))
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment error: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_transient() {
        let err = ApiError::Status {
            status: 503,
            message: None,
        };
        assert!(err.is_transient());

        let err = ApiError::Status {
            status: 400,
            message: Some("bad id".to_string()),
        };
        assert!(!err.is_transient());
        assert!(!ApiError::Unauthorized.is_transient());
    }

    #[test]
    fn test_user_message_prefers_server_text() {
        let err = ApiError::Status {
            status: 422,
            message: Some("Media not found in your library".to_string()),
        };
        assert_eq!(err.user_message(), "Media not found in your library");
    }

    #[test]
    fn test_user_message_falls_back() {
        let err = ApiError::Status {
            status: 500,
            message: Some("   ".to_string()),
        };
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn test_remote_stream_errors_are_final() {
        assert!(!StreamError::Remote("job failed".to_string()).is_reconnectable());
        assert!(StreamError::Closed.is_reconnectable());
    }
}
