//! MessageSource port: the queue transport seen from the consumer.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Message, TransportError};

/// Lease-based transport (a topic subscription, a queue, ...).
///
/// A received message is locked for this consumer until it is settled
/// (`acknowledge`, `abandon`, `dead_letter`) or its lock expires. Every
/// method may fail with a `TransportError`; the consumer treats those as
/// fatal except for `renew_lease`.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Receive up to `max_count` messages, waiting at most `max_wait`.
    /// An empty vector means nothing arrived in time.
    async fn receive_batch(
        &self,
        max_count: usize,
        max_wait: Duration,
    ) -> Result<Vec<Message>, TransportError>;

    /// Remove the message from the subscription.
    async fn acknowledge(&self, message: &Message) -> Result<(), TransportError>;

    /// Release the lock so the message is redelivered.
    async fn abandon(&self, message: &Message) -> Result<(), TransportError>;

    /// Move the message to the dead-letter sub-queue.
    async fn dead_letter(&self, message: &Message, reason: &str) -> Result<(), TransportError>;

    /// Extend the lock on a message that is still being processed.
    async fn renew_lease(&self, message: &Message) -> Result<(), TransportError>;

    /// Release the underlying connection. Called once when the consumer stops.
    async fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
