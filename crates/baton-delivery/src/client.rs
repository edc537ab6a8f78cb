//! HTTP forwarding to the backend with a per-attempt timeout.
//!
//! Each attempt is one POST of the original body to the backend's webhook
//! path. Transport failures are returned as errors; any HTTP answer, whatever
//! its status, is returned as a `ForwardResponse` for the engine to classify.

use std::time::{Duration, Instant};

use baton_core::IncomingEvent;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Path of the backend endpoint events are forwarded to.
pub const BACKEND_WEBHOOK_PATH: &str = "/strava/webhook";

/// Header carrying the relay's correlation ID to the backend.
pub const EVENT_ID_HEADER: &str = "X-Baton-Event-Id";

/// Header carrying the attempt number within the current window.
pub const ATTEMPT_HEADER: &str = "X-Baton-Attempt";

/// Longest response body kept for log lines.
const MAX_LOGGED_BODY: usize = 1024;

/// Configuration shared by the backend forwarder and the hand-off client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Timeout for the continuation call.
    pub hand_off_timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            hand_off_timeout: Duration::from_secs(10),
            user_agent: format!("Baton-Relay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Builds a pooled reqwest client from this configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the client cannot be
    /// built.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DeliveryError::configuration(format!("failed to build HTTP client: {e}")))
    }
}

/// Backend answer to one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response body, truncated for logging.
    pub body: String,
    /// Time spent on the request.
    pub duration: Duration,
}

impl ForwardResponse {
    /// Whether the backend accepted the event.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// The error this response represents, `None` for 2xx.
    pub fn error(&self) -> Option<DeliveryError> {
        DeliveryError::from_status(self.status_code, self.body.clone())
    }
}

/// Sends one delivery attempt to the backend.
///
/// The engine only talks to the backend through this trait so tests can
/// script backend behaviour without a network.
#[async_trait::async_trait]
pub trait Forwarder: Send + Sync + std::fmt::Debug {
    /// POSTs `event` to the backend, aborting after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` when the attempt exceeded `timeout` and
    /// `NetworkError` when no HTTP response was received.
    async fn forward(
        &self,
        event: &IncomingEvent,
        attempt: u32,
        timeout: Duration,
    ) -> Result<ForwardResponse>;
}

/// Forwarder backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    url: String,
}

impl HttpForwarder {
    /// Creates a forwarder targeting `{backend_url}/strava/webhook`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be configured with the provided settings.
    pub fn new(backend_url: &str, config: &ClientConfig) -> Result<Self> {
        let client = config.build_client()?;
        let url = format!("{}{BACKEND_WEBHOOK_PATH}", backend_url.trim_end_matches('/'));

        Ok(Self { client, url })
    }

    /// Full URL events are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(
        &self,
        event: &IncomingEvent,
        attempt: u32,
        timeout: Duration,
    ) -> Result<ForwardResponse> {
        let start_time = Instant::now();

        let span = info_span!(
            "forward_attempt",
            event_id = %event.id,
            url = %self.url,
            attempt
        );

        async move {
            tracing::debug!(bytes = event.len(), "sending event to backend");

            let request = self
                .client
                .post(&self.url)
                .timeout(timeout)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(EVENT_ID_HEADER, event.id.to_string())
                .header(ATTEMPT_HEADER, attempt.to_string())
                .body(event.body.clone());

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::debug!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_timeout() {
                        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                        return Err(DeliveryError::timeout(timeout_ms));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let forward_response = read_response(response, start_time).await;

            tracing::debug!(
                status = forward_response.status_code,
                duration_ms = forward_response.duration.as_millis(),
                "received backend response"
            );

            Ok(forward_response)
        }
        .instrument(span)
        .await
    }
}

/// Reads status and a bounded slice of the body from a response.
pub(crate) async fn read_response(response: Response, start_time: Instant) -> ForwardResponse {
    let status_code = response.status().as_u16();

    let body = match response.bytes().await {
        Ok(bytes) => truncate_body(&bytes),
        Err(e) => {
            tracing::debug!("failed to read response body: {}", e);
            String::new()
        },
    };

    ForwardResponse { status_code, body, duration: start_time.elapsed() }
}

fn truncate_body(bytes: &[u8]) -> String {
    if bytes.len() <= MAX_LOGGED_BODY {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    let truncated = String::from_utf8_lossy(&bytes[..MAX_LOGGED_BODY]);
    format!("{truncated}... (truncated)")
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_event() -> IncomingEvent {
        IncomingEvent::new(r#"{"aspect_type":"create","object_id":1}"#, "application/json")
    }

    async fn forwarder_for(server: &MockServer) -> HttpForwarder {
        HttpForwarder::new(&server.uri(), &ClientConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn posts_body_to_backend_webhook_path() {
        let mock_server = MockServer::start().await;
        let event = test_event();

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/strava/webhook"))
            .and(matchers::header("content-type", "application/json"))
            .and(matchers::header("x-baton-attempt", "1"))
            .and(matchers::header("x-baton-event-id", event.id.to_string().as_str()))
            .and(matchers::body_string(r#"{"aspect_type":"create","object_id":1}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let forwarder = forwarder_for(&mock_server).await;
        let response = forwarder.forward(&event, 1, Duration::from_secs(5)).await.unwrap();

        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "OK");
        assert!(response.is_success());
        assert!(response.error().is_none());
    }

    #[tokio::test]
    async fn error_statuses_are_responses_not_errors() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("warming up"))
            .mount(&mock_server)
            .await;

        let forwarder = forwarder_for(&mock_server).await;
        let response = forwarder.forward(&test_event(), 2, Duration::from_secs(5)).await.unwrap();

        assert_eq!(response.status_code, 503);
        assert!(!response.is_success());
        assert!(response.error().is_some_and(|e| e.is_retryable()));
    }

    #[tokio::test]
    async fn slow_backend_hits_attempt_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&mock_server)
            .await;

        let forwarder = forwarder_for(&mock_server).await;
        let result = forwarder.forward(&test_event(), 1, Duration::from_millis(100)).await;

        assert!(matches!(result, Err(DeliveryError::Timeout { timeout_ms: 100 })));
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() {
        let forwarder =
            HttpForwarder::new("http://127.0.0.1:1", &ClientConfig::default()).unwrap();

        let result = forwarder.forward(&test_event(), 1, Duration::from_secs(1)).await;

        assert!(matches!(result, Err(DeliveryError::NetworkError { .. })));
    }

    #[test]
    fn trailing_slash_in_backend_url_is_ignored() {
        let forwarder =
            HttpForwarder::new("https://api.example.com/", &ClientConfig::default()).unwrap();
        assert_eq!(forwarder.url(), "https://api.example.com/strava/webhook");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(4096);
        let truncated = truncate_body(body.as_bytes());
        assert!(truncated.ends_with("... (truncated)"));
        assert!(truncated.len() < body.len());
    }
}
