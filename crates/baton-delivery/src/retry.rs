//! Exponential backoff with additive jitter.
//!
//! The delay after attempt `k` is `min(max_delay, base_delay * 2^(k-1))` plus
//! a uniform jitter in `[0, max_jitter)`, then clamped to whatever is left of
//! the window so a sleep never carries the engine past its deadline.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponent cap keeping `2^(k-1)` inside `u32`.
const MAX_EXPONENT: u32 = 20;

/// Backoff configuration for retries inside one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    pub base_delay: Duration,

    /// Upper bound for the exponential part of a single delay.
    pub max_delay: Duration,

    /// Exclusive upper bound of the additive jitter. Zero disables jitter.
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(750),
            max_delay: Duration::from_secs(5),
            max_jitter: Duration::from_millis(300),
        }
    }
}

impl BackoffPolicy {
    /// Policy without jitter, for schedules that must be exact.
    #[must_use]
    pub fn without_jitter(self) -> Self {
        Self { max_jitter: Duration::ZERO, ..self }
    }

    /// Capped exponential part of the delay after `attempt` (1-based).
    ///
    /// Attempt 1 yields `base_delay`, attempt 2 yields `2 * base_delay`, and
    /// so on until `max_delay` is reached.
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_EXPONENT);
        let multiplier = 2_u32.saturating_pow(exponent);
        let delay = self.base_delay.saturating_mul(multiplier);

        std::cmp::min(delay, self.max_delay)
    }

    /// Uniform jitter in `[0, max_jitter)`; never negative.
    pub fn jitter<R: Rng>(&self, rng: &mut R) -> Duration {
        let max_ns = u64::try_from(self.max_jitter.as_nanos()).unwrap_or(u64::MAX);
        if max_ns == 0 {
            return Duration::ZERO;
        }

        Duration::from_nanos(rng.random_range(0..max_ns))
    }

    /// Full delay after `attempt`, before clamping to the window.
    pub fn delay_with_rng<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        self.exponential_delay(attempt).saturating_add(self.jitter(rng))
    }

    /// Delay after `attempt`, clamped to `remaining` window time.
    pub fn next_delay<R: Rng>(
        &self,
        attempt: u32,
        remaining: Duration,
        rng: &mut R,
    ) -> Duration {
        std::cmp::min(self.delay_with_rng(attempt, rng), remaining)
    }
}
