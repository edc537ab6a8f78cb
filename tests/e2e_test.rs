//! End-to-end tests over real sockets.
//!
//! The relay listens on an ephemeral port with its public URL pointing at
//! itself, so continuation hand-offs travel through real HTTP exactly as they
//! do in production. The backend is a wiremock server.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use baton_api::AppState;
use baton_core::{
    AttemptOutcome, Depth, LogEventHandler, MulticastEventHandler, RealClock, RelayEvent,
    RelayOutcome,
};
use baton_delivery::{ForwardingEngine, HttpForwarder, HttpHandOff, Relay};
use baton_testing::{
    test_config, MockBackend, RecordingEventHandler, StravaEventBuilder, TEST_CONTINUE_TOKEN,
    TEST_VERIFY_TOKEN,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot};

/// A relay serving on an ephemeral port.
struct RunningRelay {
    url: String,
    relay: Arc<Relay>,
    events: Arc<RecordingEventHandler>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl RunningRelay {
    async fn start(backend: &MockBackend) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);

        let mut config = test_config(backend.url());
        config.public_url = Some(url.clone());
        config.intake_window_ms = 400;
        config.continuation_window_ms = 300;
        config.attempt_timeout_ms = 200;
        config.retry_base_delay_ms = 50;
        config.retry_max_delay_ms = 100;
        config.retry_max_jitter_ms = 0;

        let client_config = config.to_client_config();
        let events = Arc::new(RecordingEventHandler::new());
        let mut multicast = MulticastEventHandler::new();
        multicast.add_subscriber(Arc::new(LogEventHandler::new()));
        multicast.add_subscriber(events.clone());
        let multicast = Arc::new(multicast);

        let engine = ForwardingEngine::new(
            Arc::new(HttpForwarder::new(&config.backend_url, &client_config)?),
            config.to_backoff_policy(),
            Arc::new(RealClock::new()),
            multicast.clone(),
        );
        let relay = Arc::new(Relay::new(
            engine,
            Arc::new(HttpHandOff::new(&url, &client_config)?),
            multicast,
            config.continue_token(),
            config.to_relay_settings(),
        ));

        let state = AppState::new(Arc::new(config), relay.clone());
        let (tx, rx) = oneshot::channel();
        tokio::spawn(baton_api::serve(listener, state, async move {
            let _ = rx.await;
        }));

        Ok(Self { url, relay, events, shutdown: Some(tx) })
    }

    async fn wait_idle(&self) {
        assert!(self.relay.wait_idle(Duration::from_secs(10)).await, "relay did not go idle");
    }
}

impl Drop for RunningRelay {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

#[tokio::test]
async fn event_is_delivered_after_transient_failures() -> Result<()> {
    let backend = MockBackend::start().await;
    backend.respond_in_sequence(&[503, 502, 200]).await;
    let relay = RunningRelay::start(&backend).await?;

    let body = StravaEventBuilder::new().object_id(42).build_body();
    let response = reqwest::Client::new()
        .post(format!("{}/strava/webhook", relay.url))
        .header("content-type", "application/json")
        .body(body.clone())
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.json::<Value>().await?, json!({ "status": "queued" }));

    relay.wait_idle().await;

    let requests = backend.received_requests().await;
    assert_eq!(requests.len(), 3);
    for (index, request) in requests.iter().enumerate() {
        assert_eq!(request.body, body.to_vec());
        assert_eq!(request.headers.get("x-baton-attempt").unwrap(), &(index + 1).to_string());
    }
    assert_eq!(relay.events.outcomes(), vec![RelayOutcome::Delivered { attempts: 3 }]);
    Ok(())
}

#[tokio::test]
async fn unavailable_backend_is_retried_across_chain_until_depth_limit() -> Result<()> {
    let backend = MockBackend::start().await;
    backend.always(503).await;
    let relay = RunningRelay::start(&backend).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/strava/webhook", relay.url))
        .body(StravaEventBuilder::new().build_body())
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    relay.wait_idle().await;

    let outcomes = relay.events.outcomes();
    assert_eq!(outcomes.len(), 3, "one outcome per window: {outcomes:?}");
    assert!(outcomes.contains(&RelayOutcome::HandedOff { depth: Depth::new(1) }));
    assert!(outcomes.contains(&RelayOutcome::HandedOff { depth: Depth::new(2) }));
    assert!(outcomes.contains(&RelayOutcome::Dropped { depth: Depth::new(3) }));

    // Every window makes at least one attempt.
    assert!(backend.request_count().await >= 3);
    Ok(())
}

#[tokio::test]
async fn slow_backend_attempts_time_out_and_are_retried() -> Result<()> {
    let backend = MockBackend::start().await;
    backend.stall(Duration::from_secs(2)).await;
    let relay = RunningRelay::start(&backend).await?;

    reqwest::Client::new()
        .post(format!("{}/strava/webhook", relay.url))
        .body(StravaEventBuilder::new().build_body())
        .send()
        .await?;

    relay.wait_idle().await;

    let attempts: Vec<_> = relay
        .events
        .events()
        .into_iter()
        .filter_map(|event| match event {
            RelayEvent::AttemptCompleted { attempt, .. } => Some(attempt),
            _ => None,
        })
        .collect();
    assert!(attempts.len() >= 3);
    assert!(attempts.iter().all(|attempt| attempt.outcome == AttemptOutcome::Timeout));
    assert!(attempts.iter().all(|attempt| attempt.status.is_none()));

    let outcomes = relay.events.outcomes();
    assert!(outcomes.contains(&RelayOutcome::Dropped { depth: Depth::new(3) }));
    Ok(())
}

#[tokio::test]
async fn backend_rejection_is_terminal() -> Result<()> {
    let backend = MockBackend::start().await;
    backend.always(404).await;
    let relay = RunningRelay::start(&backend).await?;

    reqwest::Client::new()
        .post(format!("{}/strava/webhook", relay.url))
        .body(StravaEventBuilder::new().build_body())
        .send()
        .await?;

    relay.wait_idle().await;

    assert_eq!(backend.request_count().await, 1);
    assert_eq!(relay.events.outcomes(), vec![RelayOutcome::Rejected { status: 404 }]);
    Ok(())
}

#[tokio::test]
async fn continuation_endpoint_requires_shared_secret() -> Result<()> {
    let backend = MockBackend::start().await;
    backend.always(200).await;
    let relay = RunningRelay::start(&backend).await?;
    let client = reqwest::Client::new();

    let forbidden = client
        .post(format!("{}/__continue", relay.url))
        .header("x-continue", "guess")
        .header("x-depth", "1")
        .body("{}")
        .send()
        .await?;
    assert_eq!(forbidden.status(), 403);
    assert_eq!(forbidden.text().await?, "forbidden");

    let accepted = client
        .post(format!("{}/__continue", relay.url))
        .header("x-continue", TEST_CONTINUE_TOKEN)
        .header("x-depth", "1")
        .body("{}")
        .send()
        .await?;
    assert_eq!(accepted.json::<Value>().await?, json!({ "status": "continuing", "depth": 1 }));

    relay.wait_idle().await;
    assert_eq!(backend.request_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn subscription_verification_round_trip() -> Result<()> {
    let backend = MockBackend::start().await;
    let relay = RunningRelay::start(&backend).await?;

    let response = reqwest::Client::new()
        .get(format!("{}/strava/webhook", relay.url))
        .query(&[
            ("hub.mode", "subscribe"),
            ("hub.challenge", "15f7d1a91c1f40f8a748fd134752feb3"),
            ("hub.verify_token", TEST_VERIFY_TOKEN),
        ])
        .send()
        .await?;

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.json::<Value>().await?,
        json!({ "hub.challenge": "15f7d1a91c1f40f8a748fd134752feb3" })
    );
    Ok(())
}

#[tokio::test]
async fn production_wiring_serves_requests() -> Result<()> {
    let backend = MockBackend::start().await;
    backend.always(200).await;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    let mut config = test_config(backend.url());
    config.public_url = Some(url.clone());

    let state = AppState::from_config(config)?;
    let relay = state.relay.clone();
    let (tx, rx) = oneshot::channel::<()>();
    let server = tokio::spawn(baton_api::serve(listener, state, async move {
        let _ = rx.await;
    }));

    let response = reqwest::Client::new()
        .post(format!("{url}/strava/webhook"))
        .body(StravaEventBuilder::new().build_body())
        .send()
        .await?;
    assert_eq!(response.status(), 200);

    assert_eq!(backend.wait_for_requests(1, Duration::from_secs(5)).await, 1);
    assert!(relay.wait_idle(Duration::from_secs(5)).await);

    let _ = tx.send(());
    server.await??;
    Ok(())
}
