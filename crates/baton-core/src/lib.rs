//! Core domain models and relay event types.
//!
//! Provides the strongly-typed primitives shared by the forwarding engine,
//! the continuation protocol and the HTTP surface: incoming events, attempt
//! records, window budgets, continuation envelopes, the error taxonomy and
//! the clock abstraction that keeps retry timing testable.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod models;
pub mod time;

pub use error::{BatonError, Result};
pub use events::{
    EventHandler, LogEventHandler, MulticastEventHandler, NoOpEventHandler, RelayEvent,
};
pub use models::{
    AttemptOutcome, ContinuationEnvelope, ContinueToken, DeliveryBudget, Depth, EventId,
    ForwardAttempt, IncomingEvent, RelayOutcome, WindowOutcome,
};
pub use time::{Clock, RealClock, TestClock};
