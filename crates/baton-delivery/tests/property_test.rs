//! Property-based tests for the backoff schedule.

use std::time::Duration;

use baton_delivery::BackoffPolicy;
use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use rand::{rngs::StdRng, SeedableRng};

/// Uses `PROPTEST_CASES` when set, otherwise 100 cases on CI and 20 locally.
fn proptest_config() -> ProptestConfig {
    let is_ci = std::env::var("CI").unwrap_or_default() == "true";
    let default_cases = if is_ci { 100 } else { 20 };

    let cases =
        std::env::var("PROPTEST_CASES").ok().and_then(|s| s.parse().ok()).unwrap_or(default_cases);

    ProptestConfig::with_cases(cases)
}

fn policy_strategy() -> impl Strategy<Value = BackoffPolicy> {
    (1u64..2_000, 0u64..20_000, 0u64..1_000).prop_map(|(base, extra, jitter)| BackoffPolicy {
        base_delay: Duration::from_millis(base),
        max_delay: Duration::from_millis(base + extra),
        max_jitter: Duration::from_millis(jitter),
    })
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Every delay sits between the capped exponential part and that plus the jitter bound.
    #[test]
    fn delay_stays_within_jitter_band(
        policy in policy_strategy(),
        attempt in 1u32..64,
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let exponential = policy.exponential_delay(attempt);
        let delay = policy.delay_with_rng(attempt, &mut rng);

        prop_assert!(exponential <= policy.max_delay);
        prop_assert!(delay >= exponential);
        if policy.max_jitter.is_zero() {
            prop_assert_eq!(delay, exponential);
        } else {
            prop_assert!(delay < exponential + policy.max_jitter);
        }
    }

    /// A sleep never outlasts what is left of the window.
    #[test]
    fn delay_never_exceeds_remaining_window(
        policy in policy_strategy(),
        attempt in 1u32..64,
        remaining_ms in 0u64..30_000,
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let remaining = Duration::from_millis(remaining_ms);

        let delay = policy.next_delay(attempt, remaining, &mut rng);

        prop_assert!(delay <= remaining);
    }

    /// Without jitter the schedule grows monotonically until it plateaus at the cap.
    #[test]
    fn schedule_without_jitter_is_monotonic(policy in policy_strategy()) {
        let policy = policy.without_jitter();
        let schedule: Vec<Duration> = (1..=32).map(|k| policy.exponential_delay(k)).collect();

        prop_assert_eq!(schedule[0], policy.base_delay);
        for pair in schedule.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        prop_assert_eq!(schedule[31], policy.max_delay);
    }
}
