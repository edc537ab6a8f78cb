//! Test data builders and configuration fixtures.

use baton_api::Config;
use baton_core::IncomingEvent;
use bytes::Bytes;
use rand::Rng;
use serde_json::{json, Value};

/// Verify token used by `test_config`.
pub const TEST_VERIFY_TOKEN: &str = "verify-me";

/// Continuation secret used by `test_config`.
pub const TEST_CONTINUE_TOKEN: &str = "baton-secret";

/// Valid configuration pointing at `backend_url`.
///
/// The public URL is set to an unroutable address; tests that exercise real
/// hand-offs override it with the bound server address.
pub fn test_config(backend_url: impl Into<String>) -> Config {
    Config {
        backend_url: backend_url.into(),
        public_url: Some("http://127.0.0.1:1".to_string()),
        strava_verify_token: TEST_VERIFY_TOKEN.to_string(),
        continue_token: TEST_CONTINUE_TOKEN.to_string(),
        ..Config::default()
    }
}

/// Builder for Strava push-subscription event bodies.
#[derive(Debug, Clone)]
pub struct StravaEventBuilder {
    aspect_type: String,
    object_type: String,
    object_id: u64,
    owner_id: u64,
    subscription_id: u64,
    event_time: u64,
    updates: Value,
}

impl StravaEventBuilder {
    /// Creates an activity `create` event with random IDs.
    pub fn new() -> Self {
        let mut rng = rand::rng();
        Self {
            aspect_type: "create".to_string(),
            object_type: "activity".to_string(),
            object_id: rng.random_range(1_000_000..10_000_000_000),
            owner_id: rng.random_range(1_000..100_000_000),
            subscription_id: 120_475,
            event_time: 1_700_000_000,
            updates: json!({}),
        }
    }

    /// Sets the aspect type (`create`, `update`, `delete`).
    #[must_use]
    pub fn aspect_type(mut self, aspect_type: impl Into<String>) -> Self {
        self.aspect_type = aspect_type.into();
        self
    }

    /// Sets the object type (`activity`, `athlete`).
    #[must_use]
    pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = object_type.into();
        self
    }

    /// Sets the object ID.
    #[must_use]
    pub fn object_id(mut self, object_id: u64) -> Self {
        self.object_id = object_id;
        self
    }

    /// Sets the owner (athlete) ID.
    #[must_use]
    pub fn owner_id(mut self, owner_id: u64) -> Self {
        self.owner_id = owner_id;
        self
    }

    /// Sets the `updates` object of an `update` event.
    #[must_use]
    pub fn updates(mut self, updates: Value) -> Self {
        self.updates = updates;
        self
    }

    /// Builds the JSON payload.
    pub fn build_json(&self) -> Value {
        json!({
            "aspect_type": self.aspect_type,
            "event_time": self.event_time,
            "object_id": self.object_id,
            "object_type": self.object_type,
            "owner_id": self.owner_id,
            "subscription_id": self.subscription_id,
            "updates": self.updates,
        })
    }

    /// Builds the raw request body.
    pub fn build_body(&self) -> Bytes {
        Bytes::from(self.build_json().to_string())
    }

    /// Builds an event as the intake handler would create it.
    pub fn build_event(&self) -> IncomingEvent {
        IncomingEvent::new(self.build_body(), "application/json")
    }
}

impl Default for StravaEventBuilder {
    fn default() -> Self {
        Self::new()
    }
}
