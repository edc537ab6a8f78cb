//! HTTP surface of the Baton webhook relay.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use anyhow::Context;
use baton_core::{LogEventHandler, RealClock};
use baton_delivery::{ForwardingEngine, HttpForwarder, HttpHandOff, Relay};

pub mod config;
pub mod crypto;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use config::Config;
pub use server::{create_router, serve, start_server, WEBHOOK_PATH};

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Validated relay configuration.
    pub config: Arc<Config>,
    /// Owner of all background forwarding windows.
    pub relay: Arc<Relay>,
}

impl AppState {
    /// Creates the handler state.
    pub fn new(config: Arc<Config>, relay: Arc<Relay>) -> Self {
        Self { config, relay }
    }

    /// Wires a relay that talks HTTP to the backend and to its own public URL.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let client_config = config.to_client_config();
        let forwarder = HttpForwarder::new(&config.backend_url, &client_config)
            .context("Failed to build backend client")?;
        let hand_off = HttpHandOff::new(&config.public_base_url(), &client_config)
            .context("Failed to build continuation client")?;
        let events = Arc::new(LogEventHandler::new());

        let engine = ForwardingEngine::new(
            Arc::new(forwarder),
            config.to_backoff_policy(),
            Arc::new(RealClock::new()),
            events.clone(),
        );
        let relay = Relay::new(
            engine,
            Arc::new(hand_off),
            events,
            config.continue_token(),
            config.to_relay_settings(),
        );

        Ok(Self::new(Arc::new(config), Arc::new(relay)))
    }
}
