//! Background windows and the baton pass between them.
//!
//! `Relay` owns every window this process started. A window runs detached
//! from the request that started it and is registered with a `TaskTracker`
//! first, so shutdown can wait for it. When a window is exhausted the relay
//! hands the event to a fresh invocation through `HandOff` instead of
//! retrying in-process: the point of the hand-off is to outlive this
//! invocation's time ceiling.

use std::{sync::Arc, time::Duration};

use baton_core::{
    ContinuationEnvelope, ContinueToken, DeliveryBudget, Depth, EventHandler, IncomingEvent,
    RelayEvent, RelayOutcome, WindowOutcome,
};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{info, info_span, warn, Instrument};

use crate::{
    continuation::{HandOff, HandOffReply},
    engine::ForwardingEngine,
};

/// Window budgets and the chain bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    /// Budget of the window started at intake.
    pub intake: DeliveryBudget,
    /// Budget of every window started by a continuation.
    pub continuation: DeliveryBudget,
    /// Highest depth a continuation may run at.
    pub max_depth: u32,
}

impl Default for RelaySettings {
    fn default() -> Self {
        let attempt_timeout = Duration::from_secs(5);
        Self {
            intake: DeliveryBudget::new(Duration::from_secs(24), attempt_timeout),
            continuation: DeliveryBudget::new(Duration::from_secs(20), attempt_timeout),
            max_depth: 2,
        }
    }
}

/// Schedules forwarding windows and hands exhausted events off.
#[derive(Debug)]
pub struct Relay {
    engine: ForwardingEngine,
    hand_off: Arc<dyn HandOff>,
    events: Arc<dyn EventHandler>,
    token: ContinueToken,
    settings: RelaySettings,
    tracker: TaskTracker,
}

impl Relay {
    /// Creates a relay.
    pub fn new(
        engine: ForwardingEngine,
        hand_off: Arc<dyn HandOff>,
        events: Arc<dyn EventHandler>,
        token: ContinueToken,
        settings: RelaySettings,
    ) -> Self {
        Self { engine, hand_off, events, token, settings, tracker: TaskTracker::new() }
    }

    /// Window budgets and depth bound in use.
    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// Starts the intake window (depth 0) for a freshly received event.
    pub fn accept(self: &Arc<Self>, event: IncomingEvent) -> JoinHandle<RelayOutcome> {
        self.dispatch(event, Depth::ZERO, self.settings.intake)
    }

    /// Starts a continuation window at `depth`.
    ///
    /// # Errors
    ///
    /// Returns `BatonError::DepthExceeded` without starting anything when
    /// `depth` is above the configured maximum.
    pub fn resume(
        self: &Arc<Self>,
        event: IncomingEvent,
        depth: Depth,
    ) -> baton_core::Result<JoinHandle<RelayOutcome>> {
        let depth = depth.ensure_within(self.settings.max_depth)?;
        Ok(self.dispatch(event, depth, self.settings.continuation))
    }

    /// Runs one window for `event` in the background.
    ///
    /// The task is registered before this returns; the handle may be dropped
    /// without cancelling the window.
    pub fn dispatch(
        self: &Arc<Self>,
        event: IncomingEvent,
        depth: Depth,
        budget: DeliveryBudget,
    ) -> JoinHandle<RelayOutcome> {
        let span = info_span!("relay_window", event_id = %event.id, depth = %depth);
        info!(
            parent: &span,
            bytes = event.len(),
            received_at = %event.received_at,
            window_ms = budget.window.as_millis(),
            "scheduling forwarding window"
        );

        let relay = Arc::clone(self);
        self.tracker.spawn(async move { relay.run(event, depth, budget).await }.instrument(span))
    }

    /// Number of windows still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits up to `grace` for every running window to finish.
    ///
    /// Returns `true` if the relay went idle in time. New windows may still
    /// be dispatched afterwards.
    pub async fn wait_idle(&self, grace: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(grace, self.tracker.wait()).await.is_ok();
        self.tracker.reopen();
        drained
    }

    async fn run(
        &self,
        event: IncomingEvent,
        depth: Depth,
        budget: DeliveryBudget,
    ) -> RelayOutcome {
        let report = self.engine.run_window(&event, depth, budget).await;

        let outcome = match report.outcome {
            WindowOutcome::Delivered => {
                RelayOutcome::Delivered { attempts: report.attempt_count() }
            },
            WindowOutcome::Rejected { status } => RelayOutcome::Rejected { status },
            WindowOutcome::Exhausted => self.pass_baton(&event, depth.next()).await,
        };

        let finished = RelayEvent::Finished { event_id: event.id, depth, outcome: outcome.clone() };
        self.events.handle_event(finished).await;

        outcome
    }

    async fn pass_baton(&self, event: &IncomingEvent, next: Depth) -> RelayOutcome {
        let envelope = ContinuationEnvelope::for_event(event, next, self.token.clone());

        match self.hand_off.hand_off(envelope).await {
            Ok(HandOffReply::Continuing { depth }) => RelayOutcome::HandedOff { depth },
            Ok(HandOffReply::Stop) => RelayOutcome::Dropped { depth: next },
            Err(error) => {
                warn!(depth = %next, error = %error, "continuation hand-off failed");
                RelayOutcome::Lost { depth: next, reason: error.to_string() }
            },
        }
    }
}
