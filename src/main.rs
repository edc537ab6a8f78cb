//! Baton webhook relay.
//!
//! Main entry point for the relay server. Initializes tracing from
//! `RUST_LOG`, loads configuration, serves the webhook endpoints and, on
//! shutdown, gives running forwarding windows a grace period before exiting.

use anyhow::{Context, Result};
use baton_api::{AppState, Config};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,baton=debug,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting Baton webhook relay");

    let config = Config::load().inspect_err(|e| error!(error = %e, "Invalid configuration"))?;
    info!(
        backend_url = %config.backend_url,
        public_url = %config.public_base_url(),
        intake_window_ms = config.intake_window_ms,
        continuation_window_ms = config.continuation_window_ms,
        max_depth = config.max_continuation_depth,
        "Configuration loaded"
    );

    let addr = config.parse_server_addr()?;
    let grace = config.shutdown_grace();
    let state = AppState::from_config(config)?;
    let relay = state.relay.clone();

    baton_api::start_server(state, addr).await.context("HTTP server failed")?;

    let pending = relay.pending();
    if pending > 0 {
        info!(pending, grace_secs = grace.as_secs(), "Waiting for forwarding windows");
    }
    if !relay.wait_idle(grace).await {
        warn!(pending = relay.pending(), "Shutdown grace period expired with windows running");
    }

    info!("Baton shutdown complete");
    Ok(())
}

/// Initializes tracing from `RUST_LOG`, falling back to the default filter
/// when it is unset or invalid.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
