//! AI completions relay.
//!
//! # Architecture Overview
//!
//! ```text
//!  Client ──▶ request id ──▶ trace ──▶ security headers ──▶ timeout
//!                                                              │
//!              ┌───────────────────────────────────────────────┤
//!              ▼                                               ▼
//!         GET /health                          rate limiter (per client)
//!         200 "OK"                                             │
//!                                                              ▼
//!                                         upload filters (multipart routes)
//!                                                              │
//!                                                              ▼
//!                                     relay handler ──▶ upstream completions API
//!                                                              │
//!  Client ◀── upstream JSON verbatim, or {"error": ...} ◀──────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use ai_relay::config::load_config;
use ai_relay::http::HttpServer;
use ai_relay::lifecycle::Shutdown;
use ai_relay::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "ai-relay", version)]
#[command(about = "Relay for chat, transcription and note analysis requests", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ai-relay: {e}");
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ai-relay starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.base_url,
        rate_limit_max = config.rate_limit.max_requests,
        rate_limit_window_secs = config.rate_limit.window_secs,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
