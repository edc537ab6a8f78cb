//! In-memory stand-ins for the relay's network seams.
//!
//! `ScriptedForwarder` plays the backend, `RecordingHandOff` plays the next
//! invocation and `RecordingEventHandler` captures everything the relay
//! reports. All three record what they saw for assertions.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use baton_core::{
    ContinuationEnvelope, Depth, EventId, IncomingEvent, RelayEvent, RelayOutcome, TestClock,
};
use baton_delivery::{
    DeliveryError, ForwardResponse, Forwarder, HandOff, HandOffReply, Result as DeliveryResult,
};
use bytes::Bytes;

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// One scripted backend behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedResponse {
    /// Backend answers with this status.
    Status(u16),
    /// Connection refused or reset.
    NetworkError,
    /// Backend stalls past the attempt timeout.
    Timeout,
}

/// A call the engine made against the scripted backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardCall {
    /// Event being forwarded.
    pub event_id: EventId,
    /// Attempt number within the window.
    pub attempt: u32,
    /// Per-attempt timeout the engine asked for.
    pub timeout: Duration,
    /// Body that would have been sent.
    pub body: Bytes,
}

/// Backend fake that replays a script; the last entry repeats forever.
///
/// A `Timeout` advances the shared `TestClock` by the attempt timeout, the
/// way a stalled backend consumes real time.
#[derive(Debug)]
pub struct ScriptedForwarder {
    script: Mutex<VecDeque<ScriptedResponse>>,
    calls: Mutex<Vec<ForwardCall>>,
    clock: TestClock,
}

impl ScriptedForwarder {
    /// Creates a forwarder; an empty script answers 200.
    pub fn new(script: impl IntoIterator<Item = ScriptedResponse>, clock: TestClock) -> Self {
        let mut script: VecDeque<_> = script.into_iter().collect();
        if script.is_empty() {
            script.push_back(ScriptedResponse::Status(200));
        }
        Self { script: Mutex::new(script), calls: Mutex::new(Vec::new()), clock }
    }

    /// Backend that always answers `status`.
    pub fn always(status: u16, clock: TestClock) -> Self {
        Self::new([ScriptedResponse::Status(status)], clock)
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<ForwardCall> {
        locked(&self.calls).clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        locked(&self.calls).len()
    }

    fn next_response(&self) -> ScriptedResponse {
        let mut script = locked(&self.script);
        if script.len() > 1 {
            script.pop_front().unwrap_or(ScriptedResponse::Status(200))
        } else {
            script.front().copied().unwrap_or(ScriptedResponse::Status(200))
        }
    }
}

#[async_trait::async_trait]
impl Forwarder for ScriptedForwarder {
    async fn forward(
        &self,
        event: &IncomingEvent,
        attempt: u32,
        timeout: Duration,
    ) -> DeliveryResult<ForwardResponse> {
        locked(&self.calls).push(ForwardCall {
            event_id: event.id,
            attempt,
            timeout,
            body: event.body.clone(),
        });

        match self.next_response() {
            ScriptedResponse::Status(status_code) => {
                Ok(ForwardResponse { status_code, body: String::new(), duration: Duration::ZERO })
            },
            ScriptedResponse::NetworkError => Err(DeliveryError::network("connection refused")),
            ScriptedResponse::Timeout => {
                self.clock.advance(timeout);
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                Err(DeliveryError::timeout(timeout_ms))
            },
        }
    }
}

/// How a `RecordingHandOff` answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandOffBehaviour {
    /// Reply `continuing` at the requested depth.
    Continue,
    /// Reply `stop`.
    Stop,
    /// Fail as if the continuation endpoint answered 403.
    Reject,
}

/// Hand-off fake recording every envelope.
#[derive(Debug)]
pub struct RecordingHandOff {
    behaviour: HandOffBehaviour,
    envelopes: Mutex<Vec<ContinuationEnvelope>>,
}

impl RecordingHandOff {
    /// Creates a hand-off with the given behaviour.
    pub fn new(behaviour: HandOffBehaviour) -> Self {
        Self { behaviour, envelopes: Mutex::new(Vec::new()) }
    }

    /// Every envelope handed off so far.
    pub fn envelopes(&self) -> Vec<ContinuationEnvelope> {
        locked(&self.envelopes).clone()
    }

    /// Depths requested so far, in order.
    pub fn depths(&self) -> Vec<Depth> {
        locked(&self.envelopes).iter().map(|envelope| envelope.depth).collect()
    }
}

impl Default for RecordingHandOff {
    fn default() -> Self {
        Self::new(HandOffBehaviour::Continue)
    }
}

#[async_trait::async_trait]
impl HandOff for RecordingHandOff {
    async fn hand_off(&self, envelope: ContinuationEnvelope) -> DeliveryResult<HandOffReply> {
        let depth = envelope.depth;
        locked(&self.envelopes).push(envelope);

        match self.behaviour {
            HandOffBehaviour::Continue => Ok(HandOffReply::Continuing { depth }),
            HandOffBehaviour::Stop => Ok(HandOffReply::Stop),
            HandOffBehaviour::Reject => Err(DeliveryError::hand_off_rejected(403, "forbidden")),
        }
    }
}

/// Event handler capturing every relay event.
#[derive(Debug, Default)]
pub struct RecordingEventHandler {
    events: Mutex<Vec<RelayEvent>>,
}

impl RecordingEventHandler {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event received so far.
    pub fn events(&self) -> Vec<RelayEvent> {
        locked(&self.events).clone()
    }

    /// Outcomes of finished windows, in order.
    pub fn outcomes(&self) -> Vec<RelayOutcome> {
        locked(&self.events)
            .iter()
            .filter_map(|event| match event {
                RelayEvent::Finished { outcome, .. } => Some(outcome.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl baton_core::EventHandler for RecordingEventHandler {
    async fn handle_event(&self, event: RelayEvent) {
        locked(&self.events).push(event);
    }
}
