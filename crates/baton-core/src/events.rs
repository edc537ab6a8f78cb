//! Relay events for decoupled outcome reporting.
//!
//! The forwarding engine and the relay emit events for every attempt,
//! window result and hand-off. Delivery outcomes never reach the provider
//! (it was acknowledged at intake), so these events are the only place they
//! surface: `LogEventHandler` turns them into structured log lines, and tests
//! subscribe to observe an event's lifecycle.
//!
//! ```text
//!  ForwardingEngine ─┐  AttemptCompleted / WindowClosed
//!                    ├──────────────────────────────▶ MulticastEventHandler
//!  Relay ────────────┘  Finished                         │
//!                                                  ┌───────┴────────┐
//!                                                  ▼                ▼
//!                                          LogEventHandler   test recorders
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::models::{Depth, EventId, ForwardAttempt, RelayOutcome, WindowOutcome};

/// Events emitted while relaying one provider notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelayEvent {
    /// A delivery attempt finished.
    AttemptCompleted {
        /// Event being forwarded.
        event_id: EventId,
        /// Window depth the attempt ran in.
        depth: Depth,
        /// The attempt record.
        attempt: ForwardAttempt,
    },

    /// A forwarding window ended.
    WindowClosed {
        /// Event being forwarded.
        event_id: EventId,
        /// Window depth.
        depth: Depth,
        /// How the window ended.
        outcome: WindowOutcome,
        /// Attempts made in the window.
        attempts: u32,
    },

    /// A background window settled what happens to its event next.
    Finished {
        /// Event being forwarded.
        event_id: EventId,
        /// Depth of the window that finished.
        depth: Depth,
        /// Final disposition of the window.
        outcome: RelayOutcome,
    },
}

impl RelayEvent {
    /// Correlation ID of the event this relates to.
    pub fn event_id(&self) -> EventId {
        match self {
            Self::AttemptCompleted { event_id, .. }
            | Self::WindowClosed { event_id, .. }
            | Self::Finished { event_id, .. } => *event_id,
        }
    }
}

/// Trait for handling relay events.
///
/// Handlers must not block the relay; failures are logged, never propagated.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles a relay event.
    async fn handle_event(&self, event: RelayEvent);
}

/// No-op event handler that discards all events.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Creates a new no-op event handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: RelayEvent) {}
}

/// Writes relay events as structured log lines.
#[derive(Debug, Default)]
pub struct LogEventHandler;

impl LogEventHandler {
    /// Creates a new logging event handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for LogEventHandler {
    async fn handle_event(&self, event: RelayEvent) {
        match event {
            RelayEvent::AttemptCompleted { event_id, depth, attempt } => {
                if attempt.outcome.is_retryable() {
                    warn!(
                        %event_id,
                        %depth,
                        attempt = attempt.number,
                        outcome = %attempt.outcome,
                        status = attempt.status,
                        duration_ms = attempt.duration.as_millis(),
                        "delivery attempt failed"
                    );
                } else {
                    info!(
                        %event_id,
                        %depth,
                        attempt = attempt.number,
                        outcome = %attempt.outcome,
                        status = attempt.status,
                        duration_ms = attempt.duration.as_millis(),
                        "delivery attempt finished"
                    );
                }
            },
            RelayEvent::WindowClosed { event_id, depth, outcome, attempts } => {
                info!(%event_id, %depth, ?outcome, attempts, "forwarding window closed");
            },
            RelayEvent::Finished { event_id, depth, outcome } => match outcome {
                RelayOutcome::Delivered { .. } | RelayOutcome::HandedOff { .. } => {
                    info!(%event_id, %depth, %outcome, "relay window finished");
                },
                RelayOutcome::Rejected { .. } => {
                    warn!(%event_id, %depth, %outcome, "backend rejected event, not retrying");
                },
                RelayOutcome::Dropped { .. } | RelayOutcome::Lost { .. } => {
                    error!(%event_id, %depth, %outcome, "event dropped without delivery");
                },
            },
        }
    }
}

/// Multi-cast event handler that forwards events to multiple subscribers.
#[derive(Debug, Clone, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a new multicast handler with no subscribers.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Adds a subscriber to receive relay events.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: RelayEvent) {
        let futures = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move {
                handler.handle_event(event).await;
            }
        });

        futures::future::join_all(futures).await;
    }
}
