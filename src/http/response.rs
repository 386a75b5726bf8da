//! Response handling and error mapping.
//!
//! # Responsibilities
//! - Pass successful upstream responses through unchanged
//! - Map every failure to a status code and a `{"error": "..."}` body
//!
//! # Design Decisions
//! - Upstream error payloads are logged, never returned
//! - Upload rejections carry their own status (400 / 413 / 415)
//! - 429 responses carry Retry-After

use std::time::Duration;

use axum::{
    extract::{multipart::MultipartRejection, rejection::BytesRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::observability::metrics;
use crate::relay::client::{UpstreamError, UpstreamResponse};
use crate::relay::Operation;
use crate::security::rate_limit::RateLimitError;
use crate::upload::UploadError;

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

/// Every failure the relay can report to a client.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    RateLimiter(#[from] RateLimitError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("request rejected: {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("request contained neither note text nor images")]
    EmptyNotes,

    #[error("{operation} failed: {source}")]
    Upstream {
        operation: Operation,
        #[source]
        source: UpstreamError,
    },

    #[error("no route matched")]
    NotFound,

    #[error("method not allowed on this route")]
    MethodNotAllowed,

    #[error("request exceeded the overall timeout")]
    Timeout,
}

impl RelayError {
    pub fn upstream(operation: Operation) -> impl FnOnce(UpstreamError) -> Self {
        move |source| RelayError::Upstream { operation, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            RelayError::RateLimiter(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Upload(e) => e.status(),
            RelayError::InvalidJson(_) | RelayError::EmptyNotes => StatusCode::BAD_REQUEST,
            RelayError::Rejected { status, .. } => *status,
            RelayError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::NotFound => StatusCode::NOT_FOUND,
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::Timeout => StatusCode::REQUEST_TIMEOUT,
        }
    }

    /// Message safe to show to clients.
    pub fn public_message(&self) -> String {
        match self {
            RelayError::RateLimited { .. } => {
                "Too many requests, please try again later.".to_string()
            }
            RelayError::RateLimiter(_) => "Service temporarily unavailable".to_string(),
            RelayError::Upload(e) => e.to_string(),
            RelayError::InvalidJson(_) => "Request body must be valid JSON".to_string(),
            RelayError::Rejected { message, .. } => message.clone(),
            RelayError::EmptyNotes => "Provide note text or at least one image".to_string(),
            RelayError::Upstream { operation, .. } => operation.failure_message().to_string(),
            RelayError::NotFound => "Not found".to_string(),
            RelayError::MethodNotAllowed => "Method not allowed".to_string(),
            RelayError::Timeout => "Request timed out".to_string(),
        }
    }
}

impl From<BytesRejection> for RelayError {
    fn from(rejection: BytesRejection) -> Self {
        RelayError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartRejection> for RelayError {
    fn from(rejection: MultipartRejection) -> Self {
        RelayError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match &self {
            RelayError::Upstream { operation, source } => {
                tracing::error!(operation = %operation, error = %source, "Upstream call failed");
            }
            RelayError::RateLimiter(e) => {
                tracing::error!(error = %e, "Rate limit store failed, rejecting request");
            }
            RelayError::Upload(e) => {
                metrics::record_upload_rejected(e.reason());
                tracing::warn!(error = %e, "Upload rejected");
            }
            RelayError::Timeout => tracing::warn!("Request exceeded the overall timeout"),
            RelayError::RateLimited { .. }
            | RelayError::NotFound
            | RelayError::MethodNotAllowed => {}
            other => tracing::debug!(error = %other, "Request rejected"),
        }

        let status = self.status();
        let body = Json(ErrorBody {
            error: self.public_message(),
        });
        let mut response = (status, body).into_response();

        if let RelayError::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs(retry_after)));
        }

        response
    }
}

/// Whole seconds until retry, rounded up, at least 1.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// Return an upstream response to the client without modification.
pub fn passthrough(upstream: UpstreamResponse) -> Response {
    let content_type = upstream
        .content_type
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));
    (
        upstream.status,
        [(header::CONTENT_TYPE, content_type)],
        upstream.body,
    )
        .into_response()
}

/// Fallback for unknown routes.
pub async fn not_found() -> RelayError {
    RelayError::NotFound
}

/// Fallback for known routes called with the wrong method.
pub async fn method_not_allowed() -> RelayError {
    RelayError::MethodNotAllowed
}

/// Give the timeout layer's bare 408 the JSON error body.
///
/// Handlers never produce 408 themselves, so every 408 seen here comes from
/// the timeout layer.
pub async fn timeout_body(response: Response) -> Response {
    if response.status() == StatusCode::REQUEST_TIMEOUT {
        RelayError::Timeout.into_response()
    } else {
        response
    }
}
