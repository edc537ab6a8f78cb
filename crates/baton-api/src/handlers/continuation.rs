//! Internal continuation endpoint receiving the baton from an exhausted window.
//!
//! Reached only through `require_continue_token`. Replies immediately; the
//! new window runs in the background.

use axum::{
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use baton_core::{BatonError, Depth, EventId, IncomingEvent};
use baton_delivery::{
    continuation::{DEPTH_HEADER, EVENT_ID_HEADER},
    HandOffReply,
};
use bytes::Bytes;
use tracing::{info, instrument, warn};

use crate::AppState;

/// Reads the requested depth. A missing header means depth 0.
///
/// # Errors
///
/// Returns `BatonError::InvalidDepth` if the header is not a non-negative
/// integer.
pub fn requested_depth(headers: &HeaderMap) -> baton_core::Result<Depth> {
    let Some(value) = headers.get(DEPTH_HEADER) else {
        return Ok(Depth::ZERO);
    };

    value
        .to_str()
        .map_err(|_| BatonError::InvalidDepth {
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        })?
        .parse()
}

/// Starts a continuation window, or answers `stop` when the chain is over.
#[instrument(name = "continue_relay", skip_all, fields(bytes = body.len()))]
pub async fn continue_relay(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<HandOffReply> {
    let event_id =
        headers.get(EVENT_ID_HEADER).and_then(|v| v.to_str().ok()).and_then(EventId::parse);

    let depth = match requested_depth(&headers) {
        Ok(depth) => depth,
        Err(error) => {
            warn!(
                code = error.code(),
                ends_chain = error.ends_chain(),
                error = %error,
                event_id = ?event_id,
                "stopping chain"
            );
            return Json(HandOffReply::Stop);
        },
    };

    let content_type =
        headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or("application/json");
    let mut event = IncomingEvent::new(body, content_type);
    if let Some(id) = event_id {
        event = event.with_id(id);
    }

    let event_id = event.id;
    match state.relay.resume(event, depth) {
        Ok(window) => {
            drop(window);
            info!(%event_id, %depth, "continuing in a new window");
            Json(HandOffReply::Continuing { depth })
        },
        Err(error) => {
            warn!(
                code = error.code(),
                ends_chain = error.ends_chain(),
                %event_id,
                %depth,
                max_depth = state.relay.settings().max_depth,
                "continuation depth exhausted, dropping event"
            );
            Json(HandOffReply::Stop)
        },
    }
}
