//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_http_requests_total` (counter): requests by route, method, status
//! - `relay_http_request_duration_seconds` (histogram): latency by route
//! - `relay_rate_limited_total` (counter): requests rejected with 429
//! - `relay_upload_rejected_total` (counter): upload filter rejections by reason
//! - `relay_upstream_requests_total` (counter): upstream calls by operation, outcome
//! - `relay_upstream_duration_seconds` (histogram): upstream latency by operation

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::Response,
};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(route: &str, method: &str, status: u16, start: Instant) {
    counter!(
        "relay_http_requests_total",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("relay_http_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("relay_rate_limited_total").increment(1);
}

pub fn record_upload_rejected(reason: &'static str) {
    counter!("relay_upload_rejected_total", "reason" => reason).increment(1);
}

pub fn record_upstream(operation: &'static str, outcome: &'static str, start: Instant) {
    counter!(
        "relay_upstream_requests_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
    histogram!("relay_upstream_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}

/// Middleware recording one request counter and latency sample per response.
pub async fn track_http_metrics(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let response = next.run(request).await;
    record_request(&route, &method, response.status().as_u16(), start);
    response
}
