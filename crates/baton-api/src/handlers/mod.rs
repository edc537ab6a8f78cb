//! HTTP request handlers for the relay.
//!
//! Handlers are grouped by endpoint:
//! - `verify` - provider subscription handshake (`GET /strava/webhook`)
//! - `intake` - provider events (`POST /strava/webhook`)
//! - `continuation` - baton pass between windows (`POST /__continue`)
//!
//! Provider-facing responses are always fast and never reflect the eventual
//! delivery outcome. Anything unmatched, including other methods on the two
//! paths, is answered by `not_found`.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

pub mod continuation;
pub mod intake;
pub mod verify;

pub use continuation::continue_relay;
pub use intake::accept_event;
pub use verify::verify_subscription;

/// Fallback for every unmatched method and path: 404 `{"Not found": null}`.
pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "Not found": null })))
}
