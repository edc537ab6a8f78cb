//! Subscription verification handshake.
//!
//! The provider calls `GET /strava/webhook?hub.mode=subscribe&hub.challenge=..
//! &hub.verify_token=..` when a subscription is created. The answer is always
//! HTTP 200: a non-200 makes the provider treat the endpoint as unhealthy.

use std::collections::HashMap;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

use crate::{crypto::secrets_match, AppState};

/// Query parameter carrying the subscription mode.
pub const MODE_PARAM: &str = "hub.mode";

/// Query parameter carrying the value to echo back.
pub const CHALLENGE_PARAM: &str = "hub.challenge";

/// Query parameter carrying the shared verify token.
pub const VERIFY_TOKEN_PARAM: &str = "hub.verify_token";

/// Returns the challenge to echo if the request is a valid subscription check.
pub fn challenge_for<'a>(
    params: &'a HashMap<String, String>,
    verify_token: &str,
) -> Option<&'a str> {
    let mode = params.get(MODE_PARAM)?;
    let challenge = params.get(CHALLENGE_PARAM)?;
    let token = params.get(VERIFY_TOKEN_PARAM)?;

    let valid = mode == "subscribe" && !challenge.is_empty() && secrets_match(token, verify_token);
    valid.then_some(challenge.as_str())
}

/// Answers the verification handshake.
///
/// Responds `{"hub.challenge": <value>}` on a match and `{}` otherwise,
/// including for malformed query strings.
#[instrument(name = "verify_subscription", skip_all)]
pub async fn verify_subscription(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> Json<Value> {
    let Ok(Query(params)) = query else {
        debug!("malformed verification query");
        return Json(json!({}));
    };

    match challenge_for(&params, &state.config.strava_verify_token) {
        Some(challenge) => {
            info!("subscription verified");
            Json(json!({ "hub.challenge": challenge }))
        },
        None => {
            debug!(mode = params.get(MODE_PARAM).map(String::as_str), "verification did not match");
            Json(json!({}))
        },
    }
}
