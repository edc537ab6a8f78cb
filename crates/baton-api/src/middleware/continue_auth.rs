//! Shared-secret guard for the continuation endpoint.
//!
//! Only the relay itself may start a continuation window. The check runs
//! before the body or the depth header is looked at.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use baton_core::BatonError;
use baton_delivery::continuation::CONTINUE_HEADER;
use tracing::warn;

use crate::{crypto::secrets_match, AppState};

/// Extracts the presented secret from the `x-continue` header.
fn extract_continue_secret(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTINUE_HEADER).and_then(|v| v.to_str().ok())
}

/// Reasons a continuation call is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueAuthError {
    /// The `x-continue` header is absent or not valid UTF-8.
    MissingSecret,
    /// The presented secret does not match.
    InvalidSecret,
}

impl IntoResponse for ContinueAuthError {
    fn into_response(self) -> Response {
        let error = BatonError::Forbidden;
        warn!(code = error.code(), reason = ?self, "rejected continuation call");

        (StatusCode::FORBIDDEN, "forbidden").into_response()
    }
}

/// Axum middleware that rejects continuation calls without the shared secret.
pub async fn require_continue_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ContinueAuthError> {
    let presented =
        extract_continue_secret(req.headers()).ok_or(ContinueAuthError::MissingSecret)?;

    if !secrets_match(presented, &state.config.continue_token) {
        return Err(ContinueAuthError::InvalidSecret);
    }

    Ok(next.run(req).await)
}
