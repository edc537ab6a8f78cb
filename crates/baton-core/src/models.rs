//! Core domain models and strongly-typed identifiers.
//!
//! Defines the incoming event, per-attempt records, window budgets and the
//! continuation envelope carried between execution windows. None of these
//! are persisted: they live only as long as the invocation that owns them.

use std::{
    fmt,
    str::FromStr,
    time::{Duration, Instant},
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BatonError, Result};

/// Relay-local correlation identifier for one received event.
///
/// Assigned at intake and carried across continuation windows so log lines
/// from different invocations can be joined. It is never used to deduplicate
/// events: the same provider notification received twice gets two IDs.
///
/// # Example
///
/// ```
/// use baton_core::models::EventId;
/// let event_id = EventId::new();
/// println!("Forwarding event: {}", event_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses an event ID from a header value, ignoring malformed input.
    pub fn parse(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A provider notification as received by the relay.
///
/// The body is forwarded verbatim; the relay never parses or validates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingEvent {
    /// Correlation ID for logging.
    pub id: EventId,
    /// Raw request body.
    pub body: Bytes,
    /// Content type declared by the sender.
    pub content_type: String,
    /// When this invocation received the event.
    pub received_at: DateTime<Utc>,
}

impl IncomingEvent {
    /// Creates an event with a fresh correlation ID.
    pub fn new(body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            body: body.into(),
            content_type: content_type.into(),
            received_at: Utc::now(),
        }
    }

    /// Replaces the correlation ID, used when a continuation carries one.
    #[must_use]
    pub fn with_id(mut self, id: EventId) -> Self {
        self.id = id;
        self
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Number of hand-offs already performed for an event.
///
/// The intake window runs at depth 0; each continuation increments it by
/// exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Depth(u32);

impl Depth {
    /// Depth of the window started at intake.
    pub const ZERO: Self = Self(0);

    /// Wraps a raw depth value.
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Depth carried by the next hand-off.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns the depth unchanged if it does not exceed `max`.
    ///
    /// # Errors
    ///
    /// Returns `BatonError::DepthExceeded` when `self > max`.
    pub fn ensure_within(self, max: u32) -> Result<Self> {
        if self.0 > max {
            return Err(BatonError::DepthExceeded { depth: self.0, max });
        }
        Ok(self)
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Depth {
    type Err = BatonError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| BatonError::InvalidDepth { value: s.to_string() })
    }
}

/// Outcome tag of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptOutcome {
    /// Backend answered 2xx.
    Success,
    /// Backend answered 4xx.
    ClientError,
    /// Backend answered 5xx or another non-2xx, non-4xx status.
    ServerError,
    /// Connection could not be made or broke mid-request.
    NetworkError,
    /// Per-attempt timeout elapsed.
    Timeout,
}

impl AttemptOutcome {
    /// Classifies an HTTP status code.
    pub const fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            400..=499 => Self::ClientError,
            _ => Self::ServerError,
        }
    }

    /// Whether another attempt may fix this outcome.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::ServerError | Self::NetworkError | Self::Timeout)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::ClientError => write!(f, "client-error"),
            Self::ServerError => write!(f, "server-error"),
            Self::NetworkError => write!(f, "network-error"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Record of one delivery try, used for logging and retry decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardAttempt {
    /// Attempt index within the window (1-based).
    pub number: u32,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// Outcome tag.
    pub outcome: AttemptOutcome,
    /// HTTP status if the backend answered.
    pub status: Option<u16>,
    /// Time spent on the attempt.
    pub duration: Duration,
}

/// How long one window may keep retrying before it must hand off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryBudget {
    /// Total time the window may spend, measured from its start.
    pub window: Duration,
    /// Upper bound for a single delivery attempt.
    pub attempt_timeout: Duration,
}

impl DeliveryBudget {
    /// Creates a budget.
    pub const fn new(window: Duration, attempt_timeout: Duration) -> Self {
        Self { window, attempt_timeout }
    }

    /// Time left in the window at `now`, zero once the deadline has passed.
    pub fn remaining(&self, start: Instant, now: Instant) -> Duration {
        self.window.saturating_sub(now.saturating_duration_since(start))
    }

    /// Whether the window has no time left at `now`.
    pub fn is_spent(&self, start: Instant, now: Instant) -> bool {
        self.remaining(start, now).is_zero()
    }
}

/// Shared secret proving a continuation call came from the relay itself.
///
/// `Debug` output is redacted so the secret never reaches the logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ContinueToken(String);

impl ContinueToken {
    /// Wraps a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Returns the raw secret for placing in a header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true if no secret was configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ContinueToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContinueToken(***)")
    }
}

/// Data carried to a follow-up invocation.
#[derive(Debug, Clone)]
pub struct ContinuationEnvelope {
    /// Correlation ID of the original event.
    pub event_id: EventId,
    /// Original event body, forwarded verbatim.
    pub body: Bytes,
    /// Hand-offs performed including this one.
    pub depth: Depth,
    /// Shared secret for the internal endpoint.
    pub token: ContinueToken,
}

impl ContinuationEnvelope {
    /// Builds the envelope handing `event` to a new window at `depth`.
    pub fn for_event(event: &IncomingEvent, depth: Depth, token: ContinueToken) -> Self {
        Self { event_id: event.id, body: event.body.clone(), depth, token }
    }
}

/// Result of one forwarding engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WindowOutcome {
    /// Backend accepted the event.
    Delivered,
    /// Backend answered 4xx; retrying cannot help.
    Rejected {
        /// Status code returned by the backend
        status: u16,
    },
    /// The window budget ran out without success.
    Exhausted,
}

/// What a background window ultimately did with its event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RelayOutcome {
    /// Backend accepted the event.
    Delivered {
        /// Attempts made in the final window
        attempts: u32,
    },
    /// Backend rejected the event with a 4xx.
    Rejected {
        /// Status code returned by the backend
        status: u16,
    },
    /// A follow-up window accepted the event.
    HandedOff {
        /// Depth carried by the hand-off
        depth: Depth,
    },
    /// The follow-up invocation refused to continue the chain.
    Dropped {
        /// Depth that was refused
        depth: Depth,
    },
    /// The hand-off call itself failed; nobody holds the event any more.
    Lost {
        /// Depth that was being handed off
        depth: Depth,
        /// Why the hand-off failed
        reason: String,
    },
}

impl RelayOutcome {
    /// Whether the event's lifetime ends with this outcome.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::HandedOff { .. })
    }
}

impl fmt::Display for RelayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered { attempts } => write!(f, "delivered after {attempts} attempts"),
            Self::Rejected { status } => write!(f, "rejected by backend with HTTP {status}"),
            Self::HandedOff { depth } => write!(f, "handed off at depth {depth}"),
            Self::Dropped { depth } => write!(f, "dropped at depth {depth}"),
            Self::Lost { depth, reason } => write!(f, "lost at depth {depth}: {reason}"),
        }
    }
}
