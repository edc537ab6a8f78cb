//! Error types and result handling for relay operations.
//!
//! Defines the domain error taxonomy with stable codes so log lines can be
//! grepped and correlated across execution windows. Delivery-specific
//! failures (HTTP status classes, timeouts) live in `baton-delivery`.

use thiserror::Error;

/// Result type alias using `BatonError`.
pub type Result<T> = std::result::Result<T, BatonError>;

/// Baton error types with codes.
#[derive(Debug, Error)]
pub enum BatonError {
    // Continuation Errors (E1001-E1003)
    /// Continuation call carried a missing or wrong shared secret (E1001).
    #[error("[E1001] Forbidden: continuation secret missing or invalid")]
    Forbidden,

    /// The `x-depth` header could not be parsed (E1002).
    #[error("[E1002] Invalid depth: {value:?} is not a non-negative integer")]
    InvalidDepth {
        /// Raw header value as received
        value: String,
    },

    /// Continuation chain is longer than allowed (E1003).
    #[error("[E1003] Depth exceeded: depth {depth} is above the maximum of {max}")]
    DepthExceeded {
        /// Depth carried by the request
        depth: u32,
        /// Configured maximum depth
        max: u32,
    },
}

impl BatonError {
    /// Returns the error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Forbidden => "E1001",
            Self::InvalidDepth { .. } => "E1002",
            Self::DepthExceeded { .. } => "E1003",
        }
    }

    /// Returns whether this error ends the continuation chain for an event.
    ///
    /// A chain that ends here drops the event: the provider already received
    /// its acknowledgement at intake time.
    pub const fn ends_chain(&self) -> bool {
        matches!(self, Self::InvalidDepth { .. } | Self::DepthExceeded { .. })
    }
}
