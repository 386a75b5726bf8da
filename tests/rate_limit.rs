//! Rate limiting through the running relay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ai_relay::http::HttpServer;
use ai_relay::security::rate_limit::{RateLimitDecision, RateLimitError, RateLimitStore};
use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::Value;

mod common;

use common::{client, relay_config, start_mock_upstream, start_relay};

const COMPLETION: &str = r#"{"choices":[]}"#;

async fn post_chat(url: &str, forwarded_for: Option<&str>) -> reqwest::Response {
    let mut request = client().post(url).body(r#"{"messages":[]}"#);
    if let Some(ip) = forwarded_for {
        request = request.header("x-forwarded-for", ip);
    }
    request.send().await.unwrap()
}

#[tokio::test]
async fn test_quota_exhaustion_returns_429() {
    let upstream = start_mock_upstream(COMPLETION).await;
    let mut config = relay_config(&upstream);
    config.rate_limit.max_requests = 3;
    let relay = start_relay(HttpServer::new(config).unwrap()).await;
    let url = relay.url("/api/openai/chat");

    for i in 0..3 {
        let res = post_chat(&url, None).await;
        assert_eq!(res.status(), StatusCode::OK, "request {} should pass", i + 1);
        assert_eq!(res.headers()["x-ratelimit-limit"], "3");
        assert_eq!(
            res.headers()["x-ratelimit-remaining"],
            (2 - i).to_string().as_str()
        );
    }

    let res = post_chat(&url, None).await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = res.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 15 * 60);
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Too many requests, please try again later.");

    // The rejected request never reached the upstream.
    assert_eq!(upstream.request_count(), 3);
}

#[tokio::test]
async fn test_quota_is_shared_across_routes() {
    let upstream = start_mock_upstream(COMPLETION).await;
    let mut config = relay_config(&upstream);
    config.rate_limit.max_requests = 2;
    let relay = start_relay(HttpServer::new(config).unwrap()).await;

    assert_eq!(post_chat(&relay.url("/api/openai"), None).await.status(), StatusCode::OK);
    assert_eq!(post_chat(&relay.url("/api/openai/chat"), None).await.status(), StatusCode::OK);

    let res = client()
        .post(relay.url("/api/openai/transcribe"))
        .multipart(reqwest::multipart::Form::new().text("model", "x"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_health_not_counted_or_blocked() {
    let upstream = start_mock_upstream(COMPLETION).await;
    let mut config = relay_config(&upstream);
    config.rate_limit.max_requests = 1;
    let relay = start_relay(HttpServer::new(config).unwrap()).await;
    let url = relay.url("/api/openai/chat");

    for _ in 0..5 {
        let res = client().get(relay.url("/health")).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    assert_eq!(post_chat(&url, None).await.status(), StatusCode::OK);
    assert_eq!(post_chat(&url, None).await.status(), StatusCode::TOO_MANY_REQUESTS);

    let res = client().get(relay.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_clients_get_separate_quotas() {
    let upstream = start_mock_upstream(COMPLETION).await;
    let mut config = relay_config(&upstream);
    config.rate_limit.max_requests = 1;
    config.rate_limit.trust_forwarded_for = true;
    let relay = start_relay(HttpServer::new(config).unwrap()).await;
    let url = relay.url("/api/openai/chat");

    assert_eq!(post_chat(&url, Some("203.0.113.1")).await.status(), StatusCode::OK);
    assert_eq!(
        post_chat(&url, Some("203.0.113.1")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(post_chat(&url, Some("203.0.113.2")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_forwarded_header_ignored_when_untrusted() {
    let upstream = start_mock_upstream(COMPLETION).await;
    let mut config = relay_config(&upstream);
    config.rate_limit.max_requests = 1;
    let relay = start_relay(HttpServer::new(config).unwrap()).await;
    let url = relay.url("/api/openai/chat");

    assert_eq!(post_chat(&url, Some("203.0.113.1")).await.status(), StatusCode::OK);
    assert_eq!(
        post_chat(&url, Some("203.0.113.2")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_disabled_limiter_lets_everything_through() {
    let upstream = start_mock_upstream(COMPLETION).await;
    let mut config = relay_config(&upstream);
    config.rate_limit.enabled = false;
    config.rate_limit.max_requests = 1;
    let relay = start_relay(HttpServer::new(config).unwrap()).await;
    let url = relay.url("/api/openai/chat");

    for _ in 0..3 {
        let res = post_chat(&url, None).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(!res.headers().contains_key("x-ratelimit-limit"));
    }
}

struct BrokenStore;

#[async_trait]
impl RateLimitStore for BrokenStore {
    async fn hit(&self, _key: &str) -> Result<RateLimitDecision, RateLimitError> {
        Err(RateLimitError::Backend("connection refused".into()))
    }
}

#[tokio::test]
async fn test_store_failure_rejects_with_503() {
    let upstream = start_mock_upstream(COMPLETION).await;
    let server = HttpServer::new(relay_config(&upstream))
        .unwrap()
        .with_rate_limit_store(Arc::new(BrokenStore));
    let relay = start_relay(server).await;

    let res = post_chat(&relay.url("/api/openai/chat"), None).await;
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert!(!body["error"].as_str().unwrap().contains("connection refused"));
    assert_eq!(upstream.request_count(), 0);
}

/// A store that allows everything and counts how often it was asked.
struct CountingStore {
    hits: AtomicUsize,
}

#[async_trait]
impl RateLimitStore for CountingStore {
    async fn hit(&self, _key: &str) -> Result<RateLimitDecision, RateLimitError> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        Ok(RateLimitDecision {
            allowed: true,
            limit: 100,
            remaining: 99,
            reset_after: std::time::Duration::from_secs(900),
        })
    }
}

#[tokio::test]
async fn test_injected_store_is_consulted_per_api_request() {
    let upstream = start_mock_upstream(COMPLETION).await;
    let store = Arc::new(CountingStore {
        hits: AtomicUsize::new(0),
    });
    let server = HttpServer::new(relay_config(&upstream))
        .unwrap()
        .with_rate_limit_store(store.clone());
    let relay = start_relay(server).await;

    post_chat(&relay.url("/api/openai/chat"), None).await;
    post_chat(&relay.url("/api/openai"), None).await;
    client().get(relay.url("/health")).send().await.unwrap();
    client().get(relay.url("/nowhere")).send().await.unwrap();

    assert_eq!(store.hits.load(Ordering::SeqCst), 2);
}
