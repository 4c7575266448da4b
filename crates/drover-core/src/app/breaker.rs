//! Batch-level circuit breaker.
//!
//! Closed: full batches are received. When a batch produces
//! `max_failures_per_batch` or more `Retry` outcomes the breaker opens.
//!
//! Open: the consumer sleeps, then receives a single probe message. A probe
//! that ends in `Success` or `Drop` closes the breaker; a `Retry` probe or an
//! empty receive keeps it open.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ProcessingOptions;
use crate::domain::Outcome;
use crate::observability::CIRCUIT_BREAKER_OPEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    failure_threshold: usize,
    open_sleep: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, open_sleep: Duration) -> Self {
        metrics::gauge!(CIRCUIT_BREAKER_OPEN).set(0.0);
        Self {
            state: BreakerState::Closed,
            failure_threshold: failure_threshold.max(1),
            open_sleep,
        }
    }

    pub fn from_options(options: &ProcessingOptions) -> Self {
        Self::new(
            options.max_failures_per_batch(),
            options.circuit_breaker_open_sleep_time(),
        )
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == BreakerState::Open
    }

    /// How long to wait before each probe while open.
    pub fn open_sleep(&self) -> Duration {
        self.open_sleep
    }

    /// Feed the outcomes of a full batch. Only opens; closing needs a probe.
    pub fn record_batch(&mut self, outcomes: &[Outcome]) -> BreakerState {
        let failures = count_failures(outcomes);
        if self.state == BreakerState::Closed && failures >= self.failure_threshold {
            info!(
                failures,
                threshold = self.failure_threshold,
                "too many failures in batch, opening circuit breaker"
            );
            self.transition(BreakerState::Open);
        }
        self.state
    }

    /// Feed the outcome of a probe. `None` means the probe receive was empty.
    pub fn record_probe(&mut self, outcome: Option<Outcome>) -> BreakerState {
        match outcome {
            Some(outcome) if !outcome.is_failure() => {
                if self.state == BreakerState::Open {
                    info!(%outcome, "probe succeeded, closing circuit breaker");
                    self.transition(BreakerState::Closed);
                }
            }
            Some(outcome) => info!(%outcome, "probe failed, circuit breaker stays open"),
            None => info!("no probe message received, circuit breaker stays open"),
        }
        self.state
    }

    fn transition(&mut self, next: BreakerState) {
        self.state = next;
        let open = if next == BreakerState::Open { 1.0 } else { 0.0 };
        metrics::gauge!(CIRCUIT_BREAKER_OPEN).set(open);
    }
}

/// Number of outcomes that count against the breaker.
pub fn count_failures(outcomes: &[Outcome]) -> usize {
    outcomes.iter().filter(|o| o.is_failure()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    use crate::domain::Outcome::{Drop as D, Retry as R, Success as S};

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(2, Duration::from_secs(5))
    }

    #[rstest]
    #[case::all_success(&[S, S, S], 0)]
    #[case::drops_are_not_failures(&[D, D, S], 0)]
    #[case::mixed(&[R, D, R, S], 2)]
    #[case::empty(&[], 0)]
    fn counts_only_retries(#[case] outcomes: &[Outcome], #[case] expected: usize) {
        assert_eq!(count_failures(outcomes), expected);
    }

    #[rstest]
    #[case::below_threshold(&[R, S, S], BreakerState::Closed)]
    #[case::at_threshold(&[R, R, S], BreakerState::Open)]
    #[case::above_threshold(&[R, R, R], BreakerState::Open)]
    #[case::drops_never_open(&[D, D, D, D], BreakerState::Closed)]
    fn batch_opens_at_threshold(#[case] outcomes: &[Outcome], #[case] expected: BreakerState) {
        let mut cb = breaker();
        assert_eq!(cb.record_batch(outcomes), expected);
        assert_eq!(cb.state(), expected);
    }

    #[test]
    fn healthy_batch_does_not_close_open_breaker() {
        let mut cb = breaker();
        cb.record_batch(&[R, R]);
        cb.record_batch(&[S, S]);
        assert!(cb.is_open());
    }

    #[rstest]
    #[case::success(Some(S), BreakerState::Closed)]
    #[case::drop(Some(D), BreakerState::Closed)]
    #[case::retry(Some(R), BreakerState::Open)]
    #[case::empty(None, BreakerState::Open)]
    fn probe_decides_whether_to_close(
        #[case] probe: Option<Outcome>,
        #[case] expected: BreakerState,
    ) {
        let mut cb = breaker();
        cb.record_batch(&[R, R]);
        assert_eq!(cb.record_probe(probe), expected);
    }

    #[test]
    fn zero_threshold_is_treated_as_one() {
        let mut cb = CircuitBreaker::new(0, Duration::from_secs(1));
        cb.record_batch(&[S]);
        assert!(!cb.is_open());
        cb.record_batch(&[R]);
        assert!(cb.is_open());
    }
}
