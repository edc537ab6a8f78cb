//! Constant-time secret comparison.
//!
//! Both shared secrets the relay checks (the provider's verify token and the
//! continuation secret) are compared without short-circuiting on the first
//! differing byte.

/// Returns true if `presented` equals `expected`.
///
/// An empty `expected` secret never matches, so an unconfigured secret cannot
/// be satisfied by an empty header.
///
/// # Example
///
/// ```
/// use baton_api::crypto::secrets_match;
///
/// assert!(secrets_match("s3cret", "s3cret"));
/// assert!(!secrets_match("guess", "s3cret"));
/// assert!(!secrets_match("", ""));
/// ```
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }

    timing_safe_eq(presented.as_bytes(), expected.as_bytes())
}

/// Timing-safe byte comparison.
///
/// Only the length is allowed to leak.
fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.iter().zip(b.iter()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}
