//! Processing options for the consumer loop.
//!
//! Options are assembled once at startup through `ProcessingOptionsBuilder`,
//! validated in `build()`, and never change afterwards.

use std::time::Duration;

use crate::domain::{ConfigError, RetryPolicy};

/// Validated, immutable settings for one consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOptions {
    max_messages_per_batch: usize,
    max_failures_per_batch: usize,
    max_wait_time: Duration,
    max_lease_renewal_duration: Duration,
    lease_renewal_interval: Duration,
    circuit_breaker_open_sleep_time: Duration,
    max_retry_attempts: u32,
    retry_policy: RetryPolicy,
}

impl ProcessingOptions {
    pub fn builder() -> ProcessingOptionsBuilder {
        ProcessingOptionsBuilder::new()
    }

    /// Upper bound on messages received per batch.
    pub fn max_messages_per_batch(&self) -> usize {
        self.max_messages_per_batch
    }

    /// `Retry` outcomes in one batch that open the circuit breaker.
    pub fn max_failures_per_batch(&self) -> usize {
        self.max_failures_per_batch
    }

    /// How long a receive waits before returning an empty batch.
    pub fn max_wait_time(&self) -> Duration {
        self.max_wait_time
    }

    /// Ceiling on how long one message's lease is kept alive.
    pub fn max_lease_renewal_duration(&self) -> Duration {
        self.max_lease_renewal_duration
    }

    pub fn lease_renewal_interval(&self) -> Duration {
        self.lease_renewal_interval
    }

    /// Pause between probes while the breaker is open.
    pub fn circuit_breaker_open_sleep_time(&self) -> Duration {
        self.circuit_breaker_open_sleep_time
    }

    /// In-process attempts per delivery before the message is abandoned.
    pub fn max_retry_attempts(&self) -> u32 {
        self.max_retry_attempts
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        let builder = ProcessingOptionsBuilder::new();
        ProcessingOptions {
            max_messages_per_batch: builder.max_messages_per_batch,
            max_failures_per_batch: builder.max_failures_per_batch,
            max_wait_time: builder.max_wait_time,
            max_lease_renewal_duration: builder.max_lease_renewal_duration,
            lease_renewal_interval: builder.lease_renewal_interval,
            circuit_breaker_open_sleep_time: builder.circuit_breaker_open_sleep_time,
            max_retry_attempts: builder.max_retry_attempts,
            retry_policy: builder.retry_policy,
        }
    }
}

/// Builder for `ProcessingOptions`.
///
/// # Example
/// ```ignore
/// let options = ProcessingOptions::builder()
///     .max_messages_per_batch(20)
///     .max_failures_per_batch(3)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct ProcessingOptionsBuilder {
    max_messages_per_batch: usize,
    max_failures_per_batch: usize,
    max_wait_time: Duration,
    max_lease_renewal_duration: Duration,
    lease_renewal_interval: Duration,
    circuit_breaker_open_sleep_time: Duration,
    max_retry_attempts: u32,
    retry_policy: RetryPolicy,
}

impl ProcessingOptionsBuilder {
    pub fn new() -> Self {
        Self {
            max_messages_per_batch: 10,
            max_failures_per_batch: 2,
            max_wait_time: Duration::from_secs(30),
            max_lease_renewal_duration: Duration::from_secs(5 * 60),
            lease_renewal_interval: Duration::from_secs(10),
            circuit_breaker_open_sleep_time: Duration::from_secs(5),
            max_retry_attempts: 3,
            retry_policy: RetryPolicy::doubling(),
        }
    }

    pub fn max_messages_per_batch(mut self, n: usize) -> Self {
        self.max_messages_per_batch = n;
        self
    }

    pub fn max_failures_per_batch(mut self, n: usize) -> Self {
        self.max_failures_per_batch = n;
        self
    }

    pub fn max_wait_time(mut self, d: Duration) -> Self {
        self.max_wait_time = d;
        self
    }

    pub fn max_lease_renewal_duration(mut self, d: Duration) -> Self {
        self.max_lease_renewal_duration = d;
        self
    }

    pub fn lease_renewal_interval(mut self, d: Duration) -> Self {
        self.lease_renewal_interval = d;
        self
    }

    pub fn circuit_breaker_open_sleep_time(mut self, d: Duration) -> Self {
        self.circuit_breaker_open_sleep_time = d;
        self
    }

    pub fn max_retry_attempts(mut self, n: u32) -> Self {
        self.max_retry_attempts = n;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Validate and freeze the options.
    pub fn build(self) -> Result<ProcessingOptions, ConfigError> {
        at_least_one("max_messages_per_batch", self.max_messages_per_batch as u64)?;
        at_least_one("max_failures_per_batch", self.max_failures_per_batch as u64)?;
        at_least_one("max_retry_attempts", u64::from(self.max_retry_attempts))?;
        if self.lease_renewal_interval.is_zero() {
            return Err(ConfigError::ZeroDuration("lease_renewal_interval"));
        }
        let multiplier = self.retry_policy.multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(multiplier.to_string()));
        }

        Ok(ProcessingOptions {
            max_messages_per_batch: self.max_messages_per_batch,
            max_failures_per_batch: self.max_failures_per_batch,
            max_wait_time: self.max_wait_time,
            max_lease_renewal_duration: self.max_lease_renewal_duration,
            lease_renewal_interval: self.lease_renewal_interval,
            circuit_breaker_open_sleep_time: self.circuit_breaker_open_sleep_time,
            max_retry_attempts: self.max_retry_attempts,
            retry_policy: self.retry_policy,
        })
    }
}

impl Default for ProcessingOptionsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn at_least_one(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value < 1 {
        return Err(ConfigError::TooSmall {
            field,
            min: 1,
            value,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_builder_defaults() {
        let built = ProcessingOptions::builder().build().unwrap();
        assert_eq!(built, ProcessingOptions::default());
        assert_eq!(built.max_messages_per_batch(), 10);
        assert_eq!(built.max_failures_per_batch(), 2);
        assert_eq!(built.max_wait_time(), Duration::from_secs(30));
        assert_eq!(built.max_lease_renewal_duration(), Duration::from_secs(300));
        assert_eq!(built.circuit_breaker_open_sleep_time(), Duration::from_secs(5));
        assert_eq!(built.max_retry_attempts(), 3);
    }

    #[test]
    fn rejects_zero_batch_size() {
        let err = ProcessingOptions::builder()
            .max_messages_per_batch(0)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::TooSmall {
                field: "max_messages_per_batch",
                min: 1,
                value: 0
            }
        );
    }

    #[test]
    fn rejects_zero_failure_threshold_and_attempts() {
        assert!(matches!(
            ProcessingOptions::builder().max_failures_per_batch(0).build(),
            Err(ConfigError::TooSmall { field: "max_failures_per_batch", .. })
        ));
        assert!(matches!(
            ProcessingOptions::builder().max_retry_attempts(0).build(),
            Err(ConfigError::TooSmall { field: "max_retry_attempts", .. })
        ));
    }

    #[test]
    fn rejects_zero_renewal_interval() {
        let err = ProcessingOptions::builder()
            .lease_renewal_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroDuration("lease_renewal_interval"));
    }

    #[test]
    fn rejects_shrinking_backoff() {
        let err = ProcessingOptions::builder()
            .retry_policy(RetryPolicy::new(Duration::from_secs(1), 0.5))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMultiplier(_)));
    }
}
