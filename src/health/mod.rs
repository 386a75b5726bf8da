//! Liveness endpoint.
//!
//! `GET /health` answers 200 `OK` as long as the process serves HTTP. It
//! checks no dependencies and sits outside the rate limiter.

use axum::http::StatusCode;

pub const HEALTH_PATH: &str = "/health";

pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
