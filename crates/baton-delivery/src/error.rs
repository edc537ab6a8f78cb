//! Error types for delivery and hand-off operations.
//!
//! Covers everything that can go wrong while talking to the backend or to the
//! relay's own continuation endpoint. Errors carry enough context for the log
//! line and a category so the engine can decide whether another attempt may
//! help.

use std::fmt;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error types for delivery and hand-off operations.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure
        message: String,
    },

    /// Per-attempt timeout exceeded.
    #[error("request timeout after {timeout_ms}ms")]
    Timeout {
        /// Milliseconds before the request was aborted
        timeout_ms: u64,
    },

    /// HTTP response indicated client error (4xx).
    #[error("client error: HTTP {status_code}")]
    ClientError {
        /// HTTP status code (4xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// HTTP response indicated server error (5xx).
    #[error("server error: HTTP {status_code}")]
    ServerError {
        /// HTTP status code (5xx)
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// HTTP response was neither success nor a 4xx/5xx error.
    #[error("unexpected status: HTTP {status_code}")]
    UnexpectedStatus {
        /// HTTP status code
        status_code: u16,
    },

    /// Continuation endpoint answered with a non-2xx status.
    #[error("hand-off rejected: HTTP {status_code}")]
    HandOffRejected {
        /// HTTP status code returned by the continuation endpoint
        status_code: u16,
        /// Response body content
        body: String,
    },

    /// Continuation endpoint answered 2xx with a body that is not a reply.
    #[error("invalid hand-off reply: {message}")]
    InvalidReply {
        /// Parse error message
        message: String,
    },

    /// Client could not be configured.
    #[error("invalid delivery configuration: {message}")]
    ConfigurationError {
        /// Configuration error message
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Creates a client error from HTTP response.
    pub fn client_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ClientError { status_code, body: body.into() }
    }

    /// Creates a server error from HTTP response.
    pub fn server_error(status_code: u16, body: impl Into<String>) -> Self {
        Self::ServerError { status_code, body: body.into() }
    }

    /// Creates a hand-off rejection from the continuation endpoint's response.
    pub fn hand_off_rejected(status_code: u16, body: impl Into<String>) -> Self {
        Self::HandOffRejected { status_code, body: body.into() }
    }

    /// Creates an invalid reply error.
    pub fn invalid_reply(message: impl Into<String>) -> Self {
        Self::InvalidReply { message: message.into() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Maps a non-2xx backend response to the matching error, `None` for 2xx.
    pub fn from_status(status_code: u16, body: impl Into<String>) -> Option<Self> {
        match status_code {
            200..=299 => None,
            400..=499 => Some(Self::client_error(status_code, body)),
            500..=599 => Some(Self::server_error(status_code, body)),
            _ => Some(Self::UnexpectedStatus { status_code }),
        }
    }

    /// Determines if this error represents a temporary failure that should be
    /// retried.
    ///
    /// Returns `true` for network errors, timeouts, server errors and any
    /// status outside the 2xx and 4xx ranges. Client errors are permanent:
    /// the payload or the backend's routing is wrong in a way retries cannot
    /// fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError { .. }
            | Self::Timeout { .. }
            | Self::ServerError { .. }
            | Self::UnexpectedStatus { .. } => true,

            Self::ClientError { .. }
            | Self::HandOffRejected { .. }
            | Self::InvalidReply { .. }
            | Self::ConfigurationError { .. } => false,
        }
    }

    /// Returns the HTTP status code if the peer answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ClientError { status_code, .. }
            | Self::ServerError { status_code, .. }
            | Self::UnexpectedStatus { status_code }
            | Self::HandOffRejected { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

/// Category of delivery error for log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network connectivity issues and timeouts.
    Network,
    /// HTTP client errors (4xx).
    Client,
    /// HTTP server errors (5xx) and unexpected statuses.
    Server,
    /// Continuation hand-off failures.
    HandOff,
    /// Configuration problems.
    Configuration,
}

impl From<&DeliveryError> for ErrorCategory {
    fn from(error: &DeliveryError) -> Self {
        match error {
            DeliveryError::NetworkError { .. } | DeliveryError::Timeout { .. } => Self::Network,
            DeliveryError::ClientError { .. } => Self::Client,
            DeliveryError::ServerError { .. } | DeliveryError::UnexpectedStatus { .. } => {
                Self::Server
            },
            DeliveryError::HandOffRejected { .. } | DeliveryError::InvalidReply { .. } => {
                Self::HandOff
            },
            DeliveryError::ConfigurationError { .. } => Self::Configuration,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
            Self::HandOff => write!(f, "hand_off"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}
