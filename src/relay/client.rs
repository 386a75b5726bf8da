//! Upstream HTTP client.

use std::time::{Duration, Instant};

use axum::http::{header, HeaderValue, StatusCode};
use bytes::Bytes;
use reqwest::multipart::Form;
use reqwest::RequestBuilder;
use serde::Serialize;
use thiserror::Error;

use crate::config::{Secret, TimeoutConfig, UpstreamConfig};
use crate::observability::metrics;
use crate::relay::Operation;

/// Upstream error bodies are cut to this many characters before logging.
const MAX_LOGGED_BODY_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("no upstream credential configured")]
    MissingCredential,

    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl UpstreamError {
    fn from_send(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Network(e.without_url())
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            UpstreamError::Timeout => "timeout",
            UpstreamError::Status { .. } => "error_status",
            _ => "network_error",
        }
    }
}

/// A successful (2xx) upstream response, fully buffered.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

/// Client for the completions API. Cheap to clone.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    api_key: Secret,
    chat_url: String,
    transcription_url: String,
}

impl UpstreamClient {
    pub fn new(upstream: &UpstreamConfig, timeouts: &TimeoutConfig) -> Result<Self, UpstreamError> {
        let api_key = upstream
            .api_key
            .clone()
            .ok_or(UpstreamError::MissingCredential)?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.upstream_secs))
            .user_agent(concat!("ai-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(UpstreamError::Client)?;

        Ok(Self {
            http,
            api_key,
            chat_url: upstream.chat_url(),
            transcription_url: upstream.transcription_url(),
        })
    }

    /// Send a JSON body to the chat endpoint, byte for byte.
    pub async fn chat(&self, operation: Operation, body: Bytes) -> Result<UpstreamResponse, UpstreamError> {
        let request = self
            .http
            .post(&self.chat_url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body);
        self.send(operation, request).await
    }

    /// Serialize `body` and send it to the chat endpoint.
    pub async fn chat_json<T: Serialize + ?Sized>(
        &self,
        operation: Operation,
        body: &T,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let request = self.http.post(&self.chat_url).json(body);
        self.send(operation, request).await
    }

    /// Send a multipart form to the transcription endpoint.
    pub async fn transcribe(&self, form: Form) -> Result<UpstreamResponse, UpstreamError> {
        let request = self.http.post(&self.transcription_url).multipart(form);
        self.send(Operation::Transcription, request).await
    }

    async fn send(
        &self,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let start = Instant::now();
        let result = self.execute(request).await;

        match &result {
            Ok(response) => {
                metrics::record_upstream(operation.as_str(), "success", start);
                tracing::debug!(
                    operation = %operation,
                    status = %response.status,
                    size = response.body.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Upstream call succeeded"
                );
            }
            Err(e) => {
                metrics::record_upstream(operation.as_str(), e.outcome(), start);
            }
        }

        result
    }

    async fn execute(&self, request: RequestBuilder) -> Result<UpstreamResponse, UpstreamError> {
        let response = request
            .bearer_auth(self.api_key.expose())
            .send()
            .await
            .map_err(UpstreamError::from_send)?;

        let status = response.status();
        let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
        let body = response.bytes().await.map_err(UpstreamError::from_send)?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status,
                body: truncate(&String::from_utf8_lossy(&body), MAX_LOGGED_BODY_CHARS),
            });
        }

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_credential() {
        let result = UpstreamClient::new(&UpstreamConfig::default(), &TimeoutConfig::default());
        assert!(matches!(result, Err(UpstreamError::MissingCredential)));
    }

    #[test]
    fn test_builds_endpoint_urls() {
        let mut upstream = UpstreamConfig::default();
        upstream.base_url = "http://127.0.0.1:1/v1".into();
        upstream.api_key = Some(Secret::new("sk-test"));

        let client = UpstreamClient::new(&upstream, &TimeoutConfig::default()).unwrap();
        assert_eq!(client.chat_url, "http://127.0.0.1:1/v1/chat/completions");
        assert_eq!(client.transcription_url, "http://127.0.0.1:1/v1/audio/transcriptions");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_network_error() {
        let mut upstream = UpstreamConfig::default();
        // Port 9 (discard) on loopback is closed in test environments.
        upstream.base_url = "http://127.0.0.1:9".into();
        upstream.api_key = Some(Secret::new("sk-test"));
        let timeouts = TimeoutConfig {
            connect_secs: 1,
            upstream_secs: 2,
            request_secs: 3,
        };

        let client = UpstreamClient::new(&upstream, &timeouts).unwrap();
        let err = client
            .chat(Operation::Chat, Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Network(_) | UpstreamError::Timeout));
    }
}
