//! Request middleware.

pub mod continue_auth;

pub use continue_auth::{require_continue_token, ContinueAuthError};
