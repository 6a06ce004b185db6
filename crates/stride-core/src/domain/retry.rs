//! Retry policy: classifies a failed attempt as retry-or-exhausted and
//! computes the backoff before the next attempt.

use std::time::Duration;

/// What to do with a step whose attempt just failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Revert the step to pending. `attempt` is the new `retry_count`.
    Retry { attempt: u32, delay: Duration },

    /// `retry_count == max_retries`: the step and its task fail.
    Exhausted,
}

/// Retry policy for failed steps.
///
/// The number of retries comes from each task (`max_retries`); the policy
/// only decides how long to wait before the next attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry. Zero retries on the next tick.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Retry on the very next tick.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            multiplier: 1.0,
            max_delay: Duration::ZERO,
        }
    }

    pub fn exponential(base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay,
        }
    }

    /// Delay before retry number `attempt` (1-indexed):
    /// `base_delay * multiplier^(attempt - 1)`, capped at `max_delay`.
    ///
    /// With base_delay=2s, multiplier=2.0: 2s, 4s, 8s, ...
    pub fn next_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay.max(self.base_delay))
    }

    /// Classify a failed attempt.
    pub fn decide(&self, retry_count: u32, max_retries: u32) -> RetryDecision {
        if retry_count < max_retries {
            let attempt = retry_count + 1;
            RetryDecision::Retry {
                attempt,
                delay: self.next_delay(attempt),
            }
        } else {
            RetryDecision::Exhausted
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn immediate_policy_has_no_delay() {
        let policy = RetryPolicy::immediate();
        assert_eq!(policy.next_delay(1), Duration::ZERO);
        assert_eq!(policy.next_delay(7), Duration::ZERO);
    }

    #[test]
    fn exponential_backoff_increases_until_cap() {
        let policy = RetryPolicy::exponential(
            Duration::from_secs(2),
            2.0,
            Duration::from_secs(10),
        );

        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
        assert_eq!(policy.next_delay(4), Duration::from_secs(10));
        assert_eq!(policy.next_delay(400), Duration::from_secs(10));
    }

    #[rstest]
    #[case::first_failure(0, 3, RetryDecision::Retry { attempt: 1, delay: Duration::ZERO })]
    #[case::last_retry(2, 3, RetryDecision::Retry { attempt: 3, delay: Duration::ZERO })]
    #[case::exhausted(3, 3, RetryDecision::Exhausted)]
    #[case::no_retries(0, 0, RetryDecision::Exhausted)]
    fn decide_respects_max_retries(
        #[case] retry_count: u32,
        #[case] max_retries: u32,
        #[case] expected: RetryDecision,
    ) {
        assert_eq!(
            RetryPolicy::immediate().decide(retry_count, max_retries),
            expected
        );
    }
}
