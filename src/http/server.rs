//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, security headers, timeout, rate limit)
//! - Apply per-route body limits
//! - Bind server to listener and shut down gracefully
//! - Purge expired rate-limit windows in the background

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RelayConfig;
use crate::health::{health, HEALTH_PATH};
use crate::http::request::{request_id, MakeRequestUuidV4};
use crate::http::response::{method_not_allowed, not_found, timeout_body};
use crate::observability::metrics;
use crate::relay::{handlers, RelayState, UpstreamError};
use crate::security::headers::with_security_headers;
use crate::security::rate_limit::{
    rate_limit_middleware, InMemoryStore, RateLimitState, RateLimitStore,
};

/// HTTP server for the relay.
pub struct HttpServer {
    config: RelayConfig,
    relay: RelayState,
    rate_limiter: Arc<dyn RateLimitStore>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and an
    /// in-memory rate-limit store.
    pub fn new(config: RelayConfig) -> Result<Self, UpstreamError> {
        let relay = RelayState::from_config(&config)?;
        let rate_limiter = Arc::new(InMemoryStore::from_config(&config.rate_limit));

        Ok(Self {
            config,
            relay,
            rate_limiter,
        })
    }

    /// Replace the rate-limit store, e.g. with one shared between instances.
    pub fn with_rate_limit_store(mut self, store: Arc<dyn RateLimitStore>) -> Self {
        self.rate_limiter = store;
        self
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        build_router(&self.config, self.relay.clone(), self.rate_limiter.clone())
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.base_url,
            rate_limit = self.config.rate_limit.enabled,
            "HTTP server starting"
        );

        if self.config.rate_limit.enabled {
            let interval = Duration::from_secs(self.config.rate_limit.window_secs.max(1));
            tokio::spawn(purge_loop(
                self.rate_limiter.clone(),
                interval,
                shutdown.resubscribe(),
            ));
        }

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Draining in-flight requests");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }
}

#[allow(deprecated)]
fn build_router(
    config: &RelayConfig,
    relay: RelayState,
    rate_limiter: Arc<dyn RateLimitStore>,
) -> Router {
    let json_limit = || DefaultBodyLimit::max(config.security.max_json_bytes);

    let mut api = Router::new()
        .route(
            "/api/openai",
            post(handlers::chat)
                .fallback(method_not_allowed)
                .layer(json_limit()),
        )
        .route(
            "/api/openai/chat",
            post(handlers::chat)
                .fallback(method_not_allowed)
                .layer(json_limit()),
        )
        .route(
            "/api/openai/transcribe",
            post(handlers::transcribe)
                .fallback(method_not_allowed)
                .layer(DefaultBodyLimit::max(config.uploads.audio.body_limit())),
        )
        .route(
            "/api/openai/process-notes",
            post(handlers::process_notes)
                .fallback(method_not_allowed)
                .layer(DefaultBodyLimit::max(config.uploads.images.body_limit())),
        )
        .with_state(relay);

    if config.rate_limit.enabled {
        let state = RateLimitState {
            store: rate_limiter,
            trust_forwarded_for: config.rate_limit.trust_forwarded_for,
        };
        api = api.route_layer(middleware::from_fn_with_state(state, rate_limit_middleware));
    }

    let router = Router::new()
        .route(HEALTH_PATH, get(health).fallback(method_not_allowed))
        .merge(api)
        .fallback(not_found)
        .route_layer(middleware::from_fn(metrics::track_http_metrics))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.timeouts.request_secs,
        )))
        .layer(middleware::map_response(timeout_body));

    let router = if config.security.enable_headers {
        with_security_headers(router)
    } else {
        router
    };

    router
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id(request.headers()),
            )
        }))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
}

async fn purge_loop(
    store: Arc<dyn RateLimitStore>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let purged = store.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired rate-limit windows");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
}
