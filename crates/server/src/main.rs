//! `secure-api-server` HTTP service entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP spans).
//! 3. Build the secure-api runtime: check the mode invariant, generate any
//!    missing key material, parse signature keys.
//! 4. Build the Axum router and start the server.

mod config;
mod server;
mod telemetry;

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use config::Config;
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "secure-api-server starting"
    );

    // -----------------------------------------------------------------------
    // 3. Secure API runtime
    // -----------------------------------------------------------------------
    // RSA key generation can take a while; keep it off the async workers.
    let settings = cfg.secure_api.clone();
    let api = tokio::task::spawn_blocking(move || settings.build())
        .await
        .context("secure api initialisation task failed")?
        .context("secure api configuration rejected")?;

    // -----------------------------------------------------------------------
    // 4. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(api, cfg.max_body_bytes);
    let router = server::router::build(state, Duration::from_secs(cfg.request_timeout_secs));

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
