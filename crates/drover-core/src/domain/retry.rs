//! Retry policy: decides backoff delays between in-process attempts.

use std::time::Duration;

/// Backoff schedule used by the retry wrapper.
///
/// The default doubles from one second with no ceiling: 1s, 2s, 4s, 8s, ...
/// `max_delay` optionally caps each individual wait.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub base_delay: Duration,

    /// Growth factor applied per attempt.
    pub multiplier: f64,

    /// Upper bound for a single wait, if any.
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
            max_delay: None,
        }
    }

    /// 1s base, doubling, uncapped.
    pub fn doubling() -> Self {
        Self::new(Duration::from_secs(1), 2.0)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Delay to wait after attempt number `attempts` (1-indexed) failed.
    ///
    /// delay = base_delay * multiplier^(attempts - 1), clamped to `max_delay`.
    /// Values too large to represent saturate at `Duration::MAX`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::doubling()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_policy_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.max_delay, None);
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 4)]
    #[case(4, 8)]
    #[case(6, 32)]
    fn exponential_backoff_follows_powers_of_two(#[case] attempts: u32, #[case] secs: u64) {
        let policy = RetryPolicy::doubling();
        assert_eq!(policy.next_delay(attempts), Duration::from_secs(secs));
    }

    #[test]
    fn attempt_zero_uses_base_delay() {
        let policy = RetryPolicy::doubling();
        assert_eq!(policy.next_delay(0), Duration::from_secs(1));
    }

    #[test]
    fn cap_limits_each_wait() {
        let policy = RetryPolicy::doubling().with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.next_delay(3), Duration::from_secs(4));
        assert_eq!(policy.next_delay(4), Duration::from_secs(5));
        assert_eq!(policy.next_delay(40), Duration::from_secs(5));
    }

    #[test]
    fn huge_attempt_counts_saturate_instead_of_panicking() {
        let policy = RetryPolicy::doubling();
        assert_eq!(policy.next_delay(u32::MAX), Duration::MAX);
    }
}
