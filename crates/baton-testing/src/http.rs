//! HTTP mocking of the backend for end-to-end relay tests.

use std::time::Duration;

use wiremock::{
    matchers::{method, path},
    Mock, MockServer, Request, ResponseTemplate,
};

const BACKEND_PATH: &str = "/strava/webhook";

/// Fake backend answering `POST /strava/webhook`.
pub struct MockBackend {
    server: MockServer,
}

impl MockBackend {
    /// Starts a new mock backend on a random port.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Returns the base URL of the mock backend.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Answers every delivery with `status`.
    pub async fn always(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path(BACKEND_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Answers deliveries with `statuses` in order; the last one repeats.
    pub async fn respond_in_sequence(&self, statuses: &[u16]) {
        let Some((last, leading)) = statuses.split_last() else {
            return;
        };

        for status in leading {
            Mock::given(method("POST"))
                .and(path(BACKEND_PATH))
                .respond_with(ResponseTemplate::new(*status))
                .up_to_n_times(1)
                .mount(&self.server)
                .await;
        }

        self.always(*last).await;
    }

    /// Answers every delivery with 200 after `delay`.
    pub async fn stall(&self, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(BACKEND_PATH))
            .respond_with(ResponseTemplate::new(200).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Returns all requests received by the backend.
    pub async fn received_requests(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Number of deliveries received so far.
    pub async fn request_count(&self) -> usize {
        self.received_requests().await.len()
    }

    /// Waits until at least `count` deliveries arrived or `timeout` elapses.
    ///
    /// Returns the number received.
    pub async fn wait_for_requests(&self, count: usize, timeout: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let received = self.request_count().await;
            if received >= count || tokio::time::Instant::now() >= deadline {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
