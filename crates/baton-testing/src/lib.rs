//! Test infrastructure for the Baton relay.
//!
//! `TestEnv` wires a real `Relay` and router to in-memory fakes and a
//! virtual clock, so a whole forwarding window (retries, backoff sleeps,
//! hand-off) runs in microseconds and deterministically.
//!
//! # Example
//!
//! ```no_run
//! use baton_testing::{ScriptedResponse, StravaEventBuilder, TestEnv};
//!
//! # async fn example() {
//! let env = TestEnv::builder()
//!     .script([ScriptedResponse::Status(503), ScriptedResponse::Status(200)])
//!     .build();
//!
//! let outcome = env.relay.accept(StravaEventBuilder::new().build_event()).await.unwrap();
//! assert!(outcome.is_terminal());
//! assert_eq!(env.forwarder.call_count(), 2);
//! # }
//! ```

pub mod fakes;
pub mod fixtures;
pub mod http;

use std::{sync::Arc, time::Duration};

use axum::Router;
use baton_api::{create_router, AppState, Config};
use baton_core::{LogEventHandler, MulticastEventHandler};
use baton_delivery::{BackoffPolicy, ForwardingEngine, Relay};

pub use baton_core::TestClock;
pub use fakes::{
    ForwardCall, HandOffBehaviour, RecordingEventHandler, RecordingHandOff, ScriptedForwarder,
    ScriptedResponse,
};
pub use fixtures::{test_config, StravaEventBuilder, TEST_CONTINUE_TOKEN, TEST_VERIFY_TOKEN};
pub use http::MockBackend;

/// A relay wired to fakes, plus handles to inspect them.
pub struct TestEnv {
    /// Virtual clock shared by the engine and the forwarder.
    pub clock: TestClock,
    /// Scripted backend.
    pub forwarder: Arc<ScriptedForwarder>,
    /// Recorded continuation hand-offs.
    pub hand_off: Arc<RecordingHandOff>,
    /// Recorded relay events.
    pub events: Arc<RecordingEventHandler>,
    /// Relay under test.
    pub relay: Arc<Relay>,
    /// Configuration the relay and router were built from.
    pub config: Arc<Config>,
}

impl TestEnv {
    /// Environment with a backend that always answers 200.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts building a customised environment.
    pub fn builder() -> TestEnvBuilder {
        TestEnvBuilder::default()
    }

    /// Application state for handlers and the router.
    pub fn state(&self) -> AppState {
        AppState::new(Arc::clone(&self.config), Arc::clone(&self.relay))
    }

    /// Router serving this environment's relay.
    pub fn router(&self) -> Router {
        create_router(self.state())
    }

    /// Waits until every background window finished.
    ///
    /// # Panics
    ///
    /// Panics if windows are still running after five seconds of real time.
    pub async fn wait_idle(&self) {
        assert!(
            self.relay.wait_idle(Duration::from_secs(5)).await,
            "relay still had {} windows running",
            self.relay.pending()
        );
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TestEnv`.
pub struct TestEnvBuilder {
    script: Vec<ScriptedResponse>,
    hand_off: HandOffBehaviour,
    backoff: BackoffPolicy,
    config: Config,
}

impl Default for TestEnvBuilder {
    fn default() -> Self {
        Self {
            script: vec![ScriptedResponse::Status(200)],
            hand_off: HandOffBehaviour::Continue,
            backoff: BackoffPolicy::default().without_jitter(),
            config: test_config("http://backend.test"),
        }
    }
}

impl TestEnvBuilder {
    /// Sets the backend script; the last entry repeats.
    #[must_use]
    pub fn script(mut self, script: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        self.script = script.into_iter().collect();
        self
    }

    /// Sets how continuation hand-offs are answered.
    #[must_use]
    pub fn hand_off(mut self, behaviour: HandOffBehaviour) -> Self {
        self.hand_off = behaviour;
        self
    }

    /// Overrides the backoff policy. Jitter is off by default.
    #[must_use]
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Adjusts the configuration the relay is built from.
    #[must_use]
    pub fn config(mut self, adjust: impl FnOnce(&mut Config)) -> Self {
        adjust(&mut self.config);
        self
    }

    /// Builds the environment.
    pub fn build(self) -> TestEnv {
        let clock = TestClock::new();
        let forwarder = Arc::new(ScriptedForwarder::new(self.script, clock.clone()));
        let hand_off = Arc::new(RecordingHandOff::new(self.hand_off));
        let events = Arc::new(RecordingEventHandler::new());

        let mut multicast = MulticastEventHandler::new();
        multicast.add_subscriber(Arc::new(LogEventHandler));
        multicast.add_subscriber(events.clone());
        let multicast = Arc::new(multicast);

        let engine = ForwardingEngine::new(
            forwarder.clone(),
            self.backoff,
            Arc::new(clock.clone()),
            multicast.clone(),
        );
        let relay = Arc::new(Relay::new(
            engine,
            hand_off.clone(),
            multicast,
            self.config.continue_token(),
            self.config.to_relay_settings(),
        ));

        TestEnv { clock, forwarder, hand_off, events, relay, config: Arc::new(self.config) }
    }
}
