//! In-process retries around a `MessageHandler`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::config::ProcessingOptions;
use crate::domain::{Message, Outcome, RetryPolicy};
use crate::ports::MessageHandler;

/// Wraps a handler and retries `Retry` outcomes with exponential backoff.
///
/// - `Success` and `Drop` are returned as soon as they are seen.
/// - A handler error or panic counts as `Retry` for that attempt.
/// - After `max_attempts` attempts without a terminal outcome the result is
///   `Retry`, so the transport redelivers the message later.
#[derive(Clone)]
pub struct RetryingHandler {
    inner: Arc<dyn MessageHandler>,
    max_attempts: u32,
    policy: RetryPolicy,
}

/// Shorthand for `RetryingHandler::new`.
pub fn with_retry(
    handler: Arc<dyn MessageHandler>,
    max_attempts: u32,
    policy: RetryPolicy,
) -> RetryingHandler {
    RetryingHandler::new(handler, max_attempts, policy)
}

impl RetryingHandler {
    pub fn new(handler: Arc<dyn MessageHandler>, max_attempts: u32, policy: RetryPolicy) -> Self {
        Self {
            inner: handler,
            max_attempts: max_attempts.max(1),
            policy,
        }
    }

    pub fn from_options(handler: Arc<dyn MessageHandler>, options: &ProcessingOptions) -> Self {
        Self::new(
            handler,
            options.max_retry_attempts(),
            options.retry_policy().clone(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run the handler until it yields a terminal outcome or attempts run out.
    pub async fn handle(&self, message: &Message) -> Outcome {
        let mut attempt = 1;
        loop {
            let outcome = self.attempt(message, attempt).await;
            info!(
                message_id = %message.id(),
                delivery_count = message.delivery_count(),
                attempt,
                outcome = %outcome,
                "handler attempt finished"
            );

            if outcome != Outcome::Retry {
                return outcome;
            }
            if attempt >= self.max_attempts {
                warn!(
                    message_id = %message.id(),
                    attempts = attempt,
                    "retries exhausted, message will be abandoned"
                );
                return Outcome::Retry;
            }

            let delay = self.policy.next_delay(attempt);
            debug!(message_id = %message.id(), delay_ms = delay.as_millis() as u64, "backing off");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, message: &Message, attempt: u32) -> Outcome {
        match AssertUnwindSafe(self.inner.process(message))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                warn!(message_id = %message.id(), attempt, error = %err, "handler failed");
                Outcome::Retry
            }
            Err(_) => {
                warn!(message_id = %message.id(), attempt, "handler panicked");
                Outcome::Retry
            }
        }
    }
}
