//! OpenAI-compatible HTTP client.
//!
//! # Responsibilities
//! - POST chat completions to `{base_url}/chat/completions` with a bearer key
//! - Map non-success statuses to `UpstreamError::Api` with the upstream message
//! - Decode streaming responses through `sse.rs`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use thiserror::Error;
use url::Url;

use crate::config::TimeoutConfig;
use crate::upstream::sse::decode_chunks;
use crate::upstream::types::{ChatCompletion, ChatCompletionRequest, ChunkStream, UpstreamError};
use crate::upstream::ChatClient;

/// Why an `HttpChatClient` could not be built.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("API key is not a valid header value")]
    InvalidApiKey,

    #[error(transparent)]
    Client(#[from] reqwest::Error),
}

/// reqwest-backed `ChatClient` for one API key / base URL pair.
#[derive(Clone)]
pub struct HttpChatClient {
    client: reqwest::Client,
    completions_url: Url,
}

impl HttpChatClient {
    /// Build a client for one endpoint.
    pub fn new(api_key: &str, base_url: &Url, timeouts: &TimeoutConfig) -> Result<Self, ClientBuildError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| ClientBuildError::InvalidApiKey)?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.request_secs))
            .build()?;

        Ok(Self {
            client,
            completions_url: completions_url(base_url),
        })
    }

    /// Full URL requests are posted to.
    pub fn completions_url(&self) -> &Url {
        &self.completions_url
    }

    async fn post(&self, request: &ChatCompletionRequest) -> Result<reqwest::Response, UpstreamError> {
        let response = self
            .client
            .post(self.completions_url.clone())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(status = %status, error = %e, "Failed to read error body");
                String::new()
            }
        };
        Err(UpstreamError::Api {
            status: status.as_u16(),
            message: error_message(&body).unwrap_or_else(|| {
                if body.is_empty() {
                    status.to_string()
                } else {
                    body
                }
            }),
        })
    }
}

impl std::fmt::Debug for HttpChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatClient")
            .field("completions_url", &self.completions_url.as_str())
            .finish()
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn create(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion, UpstreamError> {
        let response = self.post(request).await?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| UpstreamError::Decode(e.to_string()))
    }

    async fn create_stream(&self, request: &ChatCompletionRequest) -> Result<ChunkStream, UpstreamError> {
        let mut request = request.clone();
        request.stream = Some(true);
        let response = self.post(&request).await?;
        Ok(decode_chunks(response.bytes_stream()))
    }
}

/// `https://host/v1` and `https://host/v1/` both resolve to `https://host/v1/chat/completions`.
fn completions_url(base_url: &Url) -> Url {
    let mut url = base_url.clone();
    let path = format!("{}/chat/completions", base_url.path().trim_end_matches('/'));
    url.set_path(&path);
    url
}

/// Extract `error.message` from an OpenAI-style error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}
