//! Authenticated JSON calls shared by the Key Vault and Graph adapters.

use crate::azure::token::{TokenError, TokenSource};
use crate::models::config::HttpSection;
use anyhow::{Context, Result};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::{Client, ClientBuilder, Method, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Build the HTTP client used by every adapter, token sources included.
pub fn build_client(http: &HttpSection) -> Result<Client> {
    ClientBuilder::new()
        .timeout(Duration::from_secs(http.request_timeout_secs))
        .pool_max_idle_per_host(4)
        .user_agent(concat!("appreg-rotator/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid request url: {0}")]
    Url(String),
}

/// Status and body of a completed call. Non-2xx statuses are not errors here;
/// each adapter maps them to its own error type.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn error_message(&self) -> String {
        format!("{}: {}", self.status, error_message(&self.body))
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Human-readable message from an Azure error body.
///
/// Graph and Key Vault wrap errors as `{"error": {"code", "message"}}`; the
/// token endpoint uses `{"error": "...", "error_description": "..."}`.
pub fn error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        let e = envelope.error;
        return match (e.code, e.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => "unknown error".to_string(),
        };
    }
    if let Ok(flat) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(description) = flat.error_description {
            return description;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// One REST endpoint plus the token scope used to call it.
pub struct ApiClient {
    http: Client,
    base: Url,
    tokens: Arc<dyn TokenSource>,
    scope: String,
    max_retries: u32,
}

impl ApiClient {
    pub fn new(
        http: Client,
        base: &str,
        tokens: Arc<dyn TokenSource>,
        scope: &str,
        max_retries: u32,
    ) -> Result<Self> {
        let base = Url::parse(base).with_context(|| format!("invalid endpoint '{}'", base))?;
        Ok(Self {
            http,
            base,
            tokens,
            scope: scope.to_string(),
            max_retries,
        })
    }

    /// Endpoint URL with each segment appended percent-encoded.
    pub fn url(&self, segments: &[&str]) -> Result<Url, HttpError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| HttpError::Url(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Single attempt. Used for mutations, which are never replayed.
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, HttpError> {
        let token = self.tokens.token(&self.scope).await?;

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(token.as_str());
        if let Some(b) = body {
            request = request.json(b);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.without_url().to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HttpError::Transport(e.without_url().to_string()))?;

        debug!(%method, path = url.path(), status = status.as_u16(), "azure call");
        Ok(ApiResponse { status, body })
    }

    /// GET with up to `max_retries` retries on transport errors, 429 and 5xx.
    pub async fn get_with_retry(&self, url: Url) -> Result<ApiResponse, HttpError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let mut retries = 0;

        loop {
            let result = self.send(Method::GET, url.clone(), None).await;

            let retryable = match &result {
                Ok(response) => is_transient(response.status),
                Err(HttpError::Transport(_)) => true,
                Err(_) => false,
            };
            if !retryable || retries >= self.max_retries {
                return result;
            }
            retries += 1;

            match backoff.next_backoff() {
                Some(delay) => {
                    warn!(
                        path = url.path(),
                        retry = retries,
                        delay_ms = delay.as_millis() as u64,
                        "retrying request after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return result,
            }
        }
    }
}
