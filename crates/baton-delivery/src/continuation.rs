//! Continuation hand-off: passing an unfinished event to a fresh invocation.
//!
//! When a window is exhausted the relay POSTs the original body to its own
//! internal endpoint, authenticated with a shared secret and carrying the
//! depth of the new window. The receiving invocation answers immediately with
//! either `continuing` or `stop`.

use std::time::Instant;

use baton_core::{ContinuationEnvelope, Depth};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, Instrument};

use crate::{
    client::{read_response, ClientConfig},
    error::{DeliveryError, Result},
};

/// Internal path that accepts hand-offs.
pub const CONTINUE_PATH: &str = "/__continue";

/// Header carrying the shared secret.
pub const CONTINUE_HEADER: &str = "x-continue";

/// Header carrying the depth of the window being requested.
pub const DEPTH_HEADER: &str = "x-depth";

/// Header carrying the event's correlation ID.
pub const EVENT_ID_HEADER: &str = "x-event-id";

/// Reply of the continuation endpoint.
///
/// Serializes as `{"status":"continuing","depth":n}` or `{"status":"stop"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandOffReply {
    /// A new window was started at `depth`.
    Continuing {
        /// Depth of the new window
        depth: Depth,
    },
    /// The chain is over; no window was started.
    Stop,
}

/// Hands an exhausted event to another invocation.
#[async_trait::async_trait]
pub trait HandOff: Send + Sync + std::fmt::Debug {
    /// Requests a new window for the envelope's event.
    ///
    /// # Errors
    ///
    /// Returns an error if the request failed or the reply was not a valid
    /// `HandOffReply`. Either way no one is holding the event any more.
    async fn hand_off(&self, envelope: ContinuationEnvelope) -> Result<HandOffReply>;
}

/// Hand-off over HTTP to the relay's own public URL.
#[derive(Debug, Clone)]
pub struct HttpHandOff {
    client: reqwest::Client,
    url: String,
    timeout: std::time::Duration,
}

impl HttpHandOff {
    /// Creates a hand-off client posting to `{public_url}/__continue`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built.
    pub fn new(public_url: &str, config: &ClientConfig) -> Result<Self> {
        let client = config.build_client()?;
        let url = format!("{}{CONTINUE_PATH}", public_url.trim_end_matches('/'));

        Ok(Self { client, url, timeout: config.hand_off_timeout })
    }

    /// Full URL of the continuation endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl HandOff for HttpHandOff {
    async fn hand_off(&self, envelope: ContinuationEnvelope) -> Result<HandOffReply> {
        let span = info_span!(
            "hand_off",
            event_id = %envelope.event_id,
            depth = %envelope.depth,
            url = %self.url
        );

        async move {
            let start_time = Instant::now();

            let response = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(CONTINUE_HEADER, envelope.token.expose())
                .header(DEPTH_HEADER, envelope.depth.to_string())
                .header(EVENT_ID_HEADER, envelope.event_id.to_string())
                .body(envelope.body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        let timeout_ms =
                            u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                        DeliveryError::timeout(timeout_ms)
                    } else {
                        DeliveryError::network(e.to_string())
                    }
                })?;

            let response = read_response(response, start_time).await;
            debug!(status = response.status_code, "continuation endpoint answered");

            if !response.is_success() {
                return Err(DeliveryError::hand_off_rejected(response.status_code, response.body));
            }

            serde_json::from_str(&response.body)
                .map_err(|e| DeliveryError::invalid_reply(e.to_string()))
        }
        .instrument(span)
        .await
    }
}
