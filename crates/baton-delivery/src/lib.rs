//! Forwarding engine and continuation relay.
//!
//! This crate turns one received provider event into a chain of bounded
//! execution windows against the backend:
//!
//! 1. **Forward** - POST the body with a per-attempt timeout
//! 2. **Back off** - exponential delay plus jitter, clamped to the window
//! 3. **Hand off** - when a window is exhausted, ask a fresh invocation to
//!    continue at `depth + 1`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use baton_core::{ContinueToken, IncomingEvent, LogEventHandler, RealClock};
//! use baton_delivery::{
//!     BackoffPolicy, ClientConfig, ForwardingEngine, HttpForwarder, HttpHandOff, Relay,
//!     RelaySettings,
//! };
//!
//! # async fn example() -> baton_delivery::Result<()> {
//! let config = ClientConfig::default();
//! let events = Arc::new(LogEventHandler::new());
//! let engine = ForwardingEngine::new(
//!     Arc::new(HttpForwarder::new("https://api.example.com", &config)?),
//!     BackoffPolicy::default(),
//!     Arc::new(RealClock::new()),
//!     events.clone(),
//! );
//! let relay = Arc::new(Relay::new(
//!     engine,
//!     Arc::new(HttpHandOff::new("https://relay.example.com", &config)?),
//!     events,
//!     ContinueToken::new("shared-secret"),
//!     RelaySettings::default(),
//! ));
//!
//! relay.accept(IncomingEvent::new(r#"{"object_id":1}"#, "application/json"));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod client;
pub mod continuation;
pub mod engine;
pub mod error;
pub mod relay;
pub mod retry;

pub use client::{ClientConfig, ForwardResponse, Forwarder, HttpForwarder};
pub use continuation::{HandOff, HandOffReply, HttpHandOff};
pub use engine::{ForwardingEngine, WindowReport};
pub use error::{DeliveryError, ErrorCategory, Result};
pub use relay::{Relay, RelaySettings};
pub use retry::BackoffPolicy;
