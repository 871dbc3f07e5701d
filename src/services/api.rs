use reqwest::cookie::Jar;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::TrackerConfig;
use crate::error::ApiError;

const REFRESH_PATH: &[&str] = &["api", "auth", "refresh"];
const HEALTH_PATH: &[&str] = &["health"];

/// Outcome of a status fetch: the backend distinguishes "ready", "not ready
/// yet" (202) and "not found" (404) before reporting any job status.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome<T> {
    Ready(T),
    NotReady,
    NotFound,
}

impl<T> FetchOutcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchOutcome<U> {
        match self {
            FetchOutcome::Ready(value) => FetchOutcome::Ready(f(value)),
            FetchOutcome::NotReady => FetchOutcome::NotReady,
            FetchOutcome::NotFound => FetchOutcome::NotFound,
        }
    }
}

/// Error body shapes the backend uses.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Session-cookie authenticated client for the verification backend.
///
/// A 401 triggers exactly one token refresh and one retry of the request.
pub struct ApiClient {
    http: Client,
    stream_http: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ApiError> {
        // Url::join replaces the last segment unless the base ends with '/'
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase));
        }

        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(request_timeout)
            .build()?;
        // Step streams stay open for the whole job; only the connect is bounded.
        let stream_http = Client::builder()
            .cookie_provider(jar)
            .connect_timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            stream_http,
            base_url,
        })
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self, ApiError> {
        Self::new(&config.api_base_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL below the base path, one segment at a time.
    ///
    /// Each segment is percent-encoded on its own, so a job ID carrying `/`,
    /// `?` or `#` cannot leave its route. Empty and dot segments are rejected.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        if let Some(bad) = segments
            .iter()
            .find(|segment| matches!(**segment, "" | "." | ".."))
        {
            return Err(ApiError::InvalidSegment(bad.to_string()));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<B, T>(&self, path: &[&str], body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        tracing::debug!(url = %url, "Submitting job");
        let response = self
            .execute(&self.http, |http| http.post(url.clone()).json(body))
            .await?;
        decode(response).await
    }

    /// GET a job snapshot, classifying 202 and 404 before decoding.
    pub async fn get_snapshot<T: DeserializeOwned>(
        &self,
        path: &[&str],
    ) -> Result<FetchOutcome<T>, ApiError> {
        let url = self.endpoint(path)?;
        let response = self
            .execute(&self.http, |http| http.get(url.clone()))
            .await?;

        match response.status() {
            StatusCode::ACCEPTED => Ok(FetchOutcome::NotReady),
            StatusCode::NOT_FOUND => Ok(FetchOutcome::NotFound),
            _ => decode(response).await.map(FetchOutcome::Ready),
        }
    }

    /// Open a `text/event-stream` response. The caller owns the body.
    pub async fn open_event_stream(&self, path: &[&str]) -> Result<Response, ApiError> {
        let url = self.endpoint(path)?;
        let response = self
            .execute(&self.stream_http, |http| {
                http.get(url.clone())
                    .header(reqwest::header::ACCEPT, "text/event-stream")
            })
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response)
    }

    /// Whether the backend answers at all. Any HTTP status counts as reachable.
    pub async fn is_reachable(&self) -> bool {
        let url = match self.endpoint(HEALTH_PATH) {
            Ok(url) => url,
            Err(_) => return false,
        };
        self.http.get(url).send().await.is_ok()
    }

    async fn execute(
        &self,
        client: &Client,
        build: impl Fn(&Client) -> RequestBuilder,
    ) -> Result<Response, ApiError> {
        let response = build(client).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        tracing::debug!(url = %response.url(), "Session expired, refreshing token");
        self.refresh_session().await?;

        let retried = build(client).send().await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(url = %retried.url(), "Request still unauthorized after token refresh");
            return Err(ApiError::Unauthorized);
        }
        Ok(retried)
    }

    async fn refresh_session(&self) -> Result<(), ApiError> {
        let response = self.http.post(self.endpoint(REFRESH_PATH)?).send().await?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Token refresh rejected");
            return Err(ApiError::Unauthorized);
        }
        Ok(())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    if !response.status().is_success() {
        return Err(status_error(response).await);
    }
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(ApiError::Parse)
}

async fn status_error(response: Response) -> ApiError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    ApiError::Status {
        status,
        message: extract_message(&text),
    }
}

/// Pull a human-readable message out of an error body, JSON or plain text.
fn extract_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.message.or(parsed.error),
        Err(_) if !body.starts_with('{') => Some(body.to_string()),
        Err(_) => None,
    }
}
