//! Router-level tests driving the full middleware stack with `oneshot`.

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
};
use baton_core::{Depth, RelayOutcome};
use baton_testing::{
    ScriptedResponse::Status, StravaEventBuilder, TestEnv, TEST_CONTINUE_TOKEN, TEST_VERIFY_TOKEN,
};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(env: &TestEnv, request: Request<Body>) -> Response {
    env.router().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn verify_request(query: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(format!("/strava/webhook?{query}"))
        .body(Body::empty())
        .unwrap()
}

fn continue_request(secret: Option<&str>, depth: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/__continue")
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("x-continue", secret);
    }
    if let Some(depth) = depth {
        builder = builder.header("x-depth", depth);
    }
    builder.body(body).unwrap()
}

#[tokio::test]
async fn verification_echoes_challenge_on_match() {
    let env = TestEnv::new();
    let query =
        format!("hub.mode=subscribe&hub.challenge=abc123&hub.verify_token={TEST_VERIFY_TOKEN}");

    let response = send(&env, verify_request(&query)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "hub.challenge": "abc123" }));
}

#[tokio::test]
async fn verification_mismatch_still_answers_200_with_empty_object() {
    let env = TestEnv::new();

    for query in [
        "hub.mode=subscribe&hub.challenge=abc123&hub.verify_token=wrong",
        "hub.mode=unsubscribe&hub.challenge=abc123&hub.verify_token=verify-me",
        "hub.mode=subscribe&hub.verify_token=verify-me",
        "",
    ] {
        let response = send(&env, verify_request(query)).await;

        assert_eq!(response.status(), StatusCode::OK, "query {query:?}");
        assert_eq!(json_body(response).await, json!({}), "query {query:?}");
    }
}

#[tokio::test]
async fn intake_answers_queued_and_forwards_in_background() {
    let env = TestEnv::new();
    let body = StravaEventBuilder::new().aspect_type("update").build_body();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/strava/webhook")
        .header("content-type", "application/json")
        .body(Body::from(body.clone()))
        .unwrap();
    let response = send(&env, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "queued" }));

    env.wait_idle().await;
    let calls = env.forwarder.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].body, body);
}

#[tokio::test]
async fn identical_events_are_forwarded_once_per_receipt() {
    let env = TestEnv::new();
    let body = StravaEventBuilder::new()
        .object_type("athlete")
        .owner_id(134_815)
        .aspect_type("update")
        .updates(json!({ "authorized": "false" }))
        .build_body();

    for _ in 0..2 {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/strava/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.clone()))
            .unwrap();
        let response = send(&env, request).await;

        assert_eq!(json_body(response).await, json!({ "status": "queued" }));
    }

    env.wait_idle().await;
    let calls = env.forwarder.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|call| call.body == body));
    assert_ne!(calls[0].event_id, calls[1].event_id);
    assert_eq!(env.events.outcomes(), vec![
        RelayOutcome::Delivered { attempts: 1 },
        RelayOutcome::Delivered { attempts: 1 },
    ]);
}

#[tokio::test]
async fn intake_answers_queued_even_when_backend_rejects() {
    let env = TestEnv::builder().script([Status(400)]).build();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/strava/webhook")
        .body(Body::from("not even json"))
        .unwrap();
    let response = send(&env, request).await;

    assert_eq!(json_body(response).await, json!({ "status": "queued" }));
    env.wait_idle().await;
    assert_eq!(env.forwarder.call_count(), 1);
}

#[tokio::test]
async fn continuation_without_valid_secret_is_forbidden() {
    let env = TestEnv::new();

    for secret in [None, Some("wrong-secret"), Some("")] {
        let request = continue_request(secret, Some("1"), Body::from("{}"));
        let response = send(&env, request).await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"forbidden");
    }

    env.wait_idle().await;
    assert_eq!(env.forwarder.call_count(), 0);
}

#[tokio::test]
async fn continuation_within_bound_starts_window() {
    let env = TestEnv::new();
    let body = StravaEventBuilder::new().build_body();

    let request = continue_request(Some(TEST_CONTINUE_TOKEN), Some("1"), Body::from(body.clone()));
    let response = send(&env, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "continuing", "depth": 1 }));

    env.wait_idle().await;
    assert_eq!(env.forwarder.call_count(), 1);
    assert_eq!(env.forwarder.calls()[0].body, body);
}

#[tokio::test]
async fn continuation_without_depth_header_runs_at_depth_zero() {
    let env = TestEnv::new();

    let request = continue_request(Some(TEST_CONTINUE_TOKEN), None, Body::from("{}"));
    let response = send(&env, request).await;

    assert_eq!(json_body(response).await, json!({ "status": "continuing", "depth": 0 }));
    env.wait_idle().await;
}

#[tokio::test]
async fn continuation_beyond_max_depth_stops_without_forwarding() {
    let env = TestEnv::new();

    let request = continue_request(Some(TEST_CONTINUE_TOKEN), Some("3"), Body::from("{}"));
    let response = send(&env, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "stop" }));

    env.wait_idle().await;
    assert_eq!(env.forwarder.call_count(), 0);
    assert!(env.events.events().is_empty());
}

#[tokio::test]
async fn unparseable_depth_stops_the_chain() {
    let env = TestEnv::new();

    for depth in ["two", "-1", "1.5"] {
        let request = continue_request(Some(TEST_CONTINUE_TOKEN), Some(depth), Body::from("{}"));
        let response = send(&env, request).await;

        assert_eq!(json_body(response).await, json!({ "status": "stop" }), "depth {depth:?}");
    }

    assert_eq!(env.forwarder.call_count(), 0);
}

#[tokio::test]
async fn continued_window_hands_off_at_next_depth() {
    let env = TestEnv::builder().script([Status(503)]).build();

    let request = continue_request(Some(TEST_CONTINUE_TOKEN), Some("2"), Body::from("{}"));
    send(&env, request).await;
    env.wait_idle().await;

    assert_eq!(env.hand_off.depths(), vec![Depth::new(3)]);
}

#[tokio::test]
async fn unmatched_requests_get_not_found() {
    let env = TestEnv::new();

    let requests = [
        (Method::GET, "/"),
        (Method::GET, "/health"),
        (Method::POST, "/strava"),
        (Method::PUT, "/strava/webhook"),
        (Method::DELETE, "/strava/webhook"),
        (Method::GET, "/__continue"),
    ];

    for (method, uri) in requests {
        let request =
            Request::builder().method(method.clone()).uri(uri).body(Body::empty()).unwrap();
        let response = send(&env, request).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(json_body(response).await, json!({ "Not found": null }), "{method} {uri}");
    }
}

#[tokio::test]
async fn head_on_webhook_path_is_not_treated_as_verification() {
    let env = TestEnv::new();
    let query =
        format!("hub.mode=subscribe&hub.challenge=abc123&hub.verify_token={TEST_VERIFY_TOKEN}");

    let request = Request::builder()
        .method(Method::HEAD)
        .uri(format!("/strava/webhook?{query}"))
        .body(Body::empty())
        .unwrap();
    let response = send(&env, request).await;

    // HEAD responses carry no body, so only the status is observable.
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(env.forwarder.call_count(), 0);
}

#[tokio::test]
async fn every_response_carries_request_id() {
    let env = TestEnv::new();

    let ok = send(&env, verify_request("")).await;
    let missing = send(&env, Request::get("/nope").body(Body::empty()).unwrap()).await;
    let forbidden = send(&env, continue_request(None, None, Body::empty())).await;

    for response in [ok, missing, forbidden] {
        let request_id = response.headers().get("x-request-id").expect("request id header");
        assert!(uuid_like(request_id.to_str().unwrap()));
    }
}

fn uuid_like(value: &str) -> bool {
    value.len() == 36 && value.chars().filter(|c| *c == '-').count() == 4
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let env = TestEnv::builder().config(|config| config.max_body_bytes = 64).build();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/strava/webhook")
        .body(Body::from(vec![b'x'; 1024]))
        .unwrap();
    let response = send(&env, request).await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(env.forwarder.call_count(), 0);
}
