//! Per-client fixed-window rate limiting.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use thiserror::Error;

use crate::config::RateLimitConfig;
use crate::http::response::{retry_after_secs, RelayError};
use crate::observability::metrics;

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Outcome of counting one request against a client's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window resets.
    pub reset_after: Duration,
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit backend error: {0}")]
    Backend(String),
}

/// Counter store behind the rate limiter.
///
/// Implementations must make `hit` atomic per key: two concurrent hits for
/// the same key never both observe the last free slot.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request for `key` and decide whether it is allowed.
    async fn hit(&self, key: &str) -> Result<RateLimitDecision, RateLimitError>;

    /// Drop state for windows that have ended. Returns how many keys were removed.
    async fn purge_expired(&self) -> usize {
        0
    }
}

struct Window {
    count: u32,
    started: Instant,
}

/// In-process store. State is lost on restart.
pub struct InMemoryStore {
    windows: DashMap<String, Window>,
    max_requests: u32,
    window: Duration,
}

impl InMemoryStore {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    /// `hit` with an explicit clock.
    pub fn hit_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        // The entry guard holds the shard lock, making check-and-increment atomic.
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert_with(|| Window { count: 0, started: now });

        if now.duration_since(entry.started) >= self.window {
            entry.count = 0;
            entry.started = now;
        }

        let reset_after = self
            .window
            .saturating_sub(now.duration_since(entry.started));
        let allowed = entry.count < self.max_requests;
        if allowed {
            entry.count += 1;
        }

        RateLimitDecision {
            allowed,
            limit: self.max_requests,
            remaining: self.max_requests - entry.count,
            reset_after,
        }
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryStore {
    async fn hit(&self, key: &str) -> Result<RateLimitDecision, RateLimitError> {
        Ok(self.hit_at(key, Instant::now()))
    }

    async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }
}

/// State for the rate limit middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub store: Arc<dyn RateLimitStore>,
    pub trust_forwarded_for: bool,
}

/// Identify the client: first X-Forwarded-For hop when trusted, else the peer IP.
pub fn client_key<B>(request: &Request<B>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(client) = forwarded {
            return client.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware function for per-client rate limiting.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&request, state.trust_forwarded_for);

    match state.store.hit(&key).await {
        Ok(decision) if decision.allowed => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
            headers.insert(
                X_RATELIMIT_RESET,
                HeaderValue::from(retry_after_secs(decision.reset_after)),
            );
            response
        }
        Ok(decision) => {
            tracing::warn!(client = %key, limit = decision.limit, "Rate limit exceeded");
            metrics::record_rate_limited();
            RelayError::RateLimited {
                retry_after: decision.reset_after,
            }
            .into_response()
        }
        Err(e) => RelayError::from(e).into_response(),
    }
}
