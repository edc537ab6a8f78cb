//! Event intake: acknowledge the provider now, deliver in the background.

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use baton_core::IncomingEvent;
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::AppState;

/// Accepts a provider event and starts its intake window.
///
/// The body is neither parsed nor validated. The response never waits for
/// delivery and never reflects its outcome. The same notification received
/// twice starts two independent windows.
#[instrument(name = "accept_event", skip_all, fields(bytes = body.len()))]
pub async fn accept_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let content_type =
        headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or("application/json");

    let event = IncomingEvent::new(body, content_type);
    info!(event_id = %event.id, "event queued for forwarding");

    // Detached: the relay tracks the window, the handle is not needed.
    drop(state.relay.accept(event));

    Json(json!({ "status": "queued" }))
}
