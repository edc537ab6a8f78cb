//! Forwarding engine: retries one event against the backend inside a window.
//!
//! A window is bounded by its `DeliveryBudget`. The engine keeps attempting
//! until the backend accepts the event, rejects it with a 4xx, or the window
//! budget is spent; it never decides what happens after an exhausted window.
//!
//! ```text
//!   ┌──────────┐ 2xx ┌───────────┐
//!   │ attempt  │────▶│ Delivered │
//!   └──────────┘     └───────────┘
//!     │  ▲    │ 4xx  ┌───────────┐
//!     │  │    └─────▶│ Rejected  │
//!     │  │           └───────────┘
//!     │ sleep(backoff clamped to remaining)
//!     ▼  │
//!   5xx / network / timeout ──deadline──▶ Exhausted
//! ```

use std::{sync::Arc, time::Duration};

use baton_core::{
    AttemptOutcome, Clock, DeliveryBudget, Depth, EventHandler, ForwardAttempt, IncomingEvent,
    RelayEvent, WindowOutcome,
};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::{
    client::Forwarder,
    error::{DeliveryError, ErrorCategory},
    retry::BackoffPolicy,
};

/// Summary of one window run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReport {
    /// How the window ended.
    pub outcome: WindowOutcome,
    /// Every attempt made, in order.
    pub attempts: Vec<ForwardAttempt>,
    /// Every backoff sleep, in order.
    pub delays: Vec<Duration>,
    /// Time the window took according to the engine's clock.
    pub elapsed: Duration,
}

impl WindowReport {
    /// Number of attempts made.
    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }

    /// Whether the backend accepted the event.
    pub fn delivered(&self) -> bool {
        matches!(self.outcome, WindowOutcome::Delivered)
    }
}

/// Drives delivery attempts for a single window.
#[derive(Debug, Clone)]
pub struct ForwardingEngine {
    forwarder: Arc<dyn Forwarder>,
    backoff: BackoffPolicy,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventHandler>,
}

impl ForwardingEngine {
    /// Creates an engine.
    pub fn new(
        forwarder: Arc<dyn Forwarder>,
        backoff: BackoffPolicy,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventHandler>,
    ) -> Self {
        Self { forwarder, backoff, clock, events }
    }

    /// Runs attempts for `event` until delivered, rejected or out of budget.
    ///
    /// The first attempt is made immediately. After every retryable failure
    /// the engine sleeps for the backoff delay, clamped so the sleep ends no
    /// later than the window deadline.
    #[instrument(
        name = "forwarding_window",
        skip_all,
        fields(
            event_id = %event.id,
            depth = %depth,
            window_ms = budget.window.as_millis(),
        )
    )]
    pub async fn run_window(
        &self,
        event: &IncomingEvent,
        depth: Depth,
        budget: DeliveryBudget,
    ) -> WindowReport {
        let start = self.clock.now();
        let mut attempts = Vec::new();
        let mut delays = Vec::new();
        let mut number: u32 = 0;

        let outcome = loop {
            if budget.is_spent(start, self.clock.now()) {
                break WindowOutcome::Exhausted;
            }

            number = number.saturating_add(1);
            let attempt = self.attempt(event, number, budget.attempt_timeout).await;
            let outcome = attempt.outcome;
            let status = attempt.status;
            attempts.push(attempt.clone());

            self.events
                .handle_event(RelayEvent::AttemptCompleted { event_id: event.id, depth, attempt })
                .await;

            match outcome {
                AttemptOutcome::Success => break WindowOutcome::Delivered,
                AttemptOutcome::ClientError => {
                    break WindowOutcome::Rejected { status: status.unwrap_or_default() };
                },
                AttemptOutcome::ServerError
                | AttemptOutcome::NetworkError
                | AttemptOutcome::Timeout => {},
            }

            let remaining = budget.remaining(start, self.clock.now());
            if remaining.is_zero() {
                continue;
            }

            // ThreadRng is !Send; it must not live across the await below.
            let delay = self.backoff.next_delay(number, remaining, &mut rand::rng());
            debug!(
                attempt = number,
                delay_ms = delay.as_millis(),
                remaining_ms = remaining.as_millis(),
                "backing off before next attempt"
            );
            delays.push(delay);
            self.clock.sleep(delay).await;
        };

        let elapsed = self.clock.now().saturating_duration_since(start);
        let report = WindowReport { outcome, attempts, delays, elapsed };

        info!(
            outcome = ?report.outcome,
            attempts = report.attempt_count(),
            elapsed_ms = elapsed.as_millis(),
            "forwarding window finished"
        );

        self.events
            .handle_event(RelayEvent::WindowClosed {
                event_id: event.id,
                depth,
                outcome: report.outcome,
                attempts: report.attempt_count(),
            })
            .await;

        report
    }

    /// Makes one attempt and records it.
    async fn attempt(
        &self,
        event: &IncomingEvent,
        number: u32,
        timeout: Duration,
    ) -> ForwardAttempt {
        let started_at = DateTime::<Utc>::from(self.clock.now_system());
        let attempt_start = self.clock.now();

        let result = self.forwarder.forward(event, number, timeout).await;
        let duration = self.clock.now().saturating_duration_since(attempt_start);

        let (outcome, status, error) = match result {
            Ok(response) => {
                let status = response.status_code;
                (AttemptOutcome::from_status(status), Some(status), response.error())
            },
            Err(error) => {
                let outcome = match error {
                    DeliveryError::Timeout { .. } => AttemptOutcome::Timeout,
                    _ => AttemptOutcome::NetworkError,
                };
                (outcome, None, Some(error))
            },
        };

        if let Some(error) = &error {
            debug!(
                attempt = number,
                status,
                category = %ErrorCategory::from(error),
                retryable = error.is_retryable(),
                error = %error,
                "delivery attempt failed"
            );
        }

        ForwardAttempt { number, started_at, outcome, status, duration }
    }
}
