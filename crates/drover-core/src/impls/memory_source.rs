//! In-memory subscription with lock-based delivery.
//!
//! Behaves like a broker subscription as far as the consumer can tell:
//! - a receive locks messages for `lock_duration` and bumps their delivery count
//! - settling requires the lock to still be held (`LeaseLost` otherwise)
//! - expired locks put the message back on the subscription
//! - a message abandoned (or expired) at `max_delivery_count` is dead-lettered
//!   by the transport itself

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;

use crate::domain::{LeaseToken, Message, MessageId, TransportError};
use crate::observability::SourceCounts;
use crate::ports::MessageSource;

pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

const MAX_DELIVERY_COUNT_EXCEEDED: &str = "MaxDeliveryCountExceeded";

/// A message moved to the dead-letter sub-queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub message_id: MessageId,
    pub payload: Vec<u8>,
    pub delivery_count: u32,
    pub reason: String,
}

#[derive(Debug)]
struct StoredMessage {
    id: MessageId,
    payload: Vec<u8>,
    enqueued_at: DateTime<Utc>,
    delivery_count: u32,
}

#[derive(Debug)]
struct LockedMessage {
    stored: StoredMessage,
    locked_until: Instant,
}

#[derive(Debug, Default)]
struct SubscriptionState {
    available: VecDeque<StoredMessage>,
    locked: HashMap<LeaseToken, LockedMessage>,
    completed: usize,
    dead_letters: Vec<DeadLetter>,
    renewals: u64,
    closed: bool,
}

impl SubscriptionState {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Return messages whose lock has run out to the subscription.
    fn reclaim_expired(&mut self, now: Instant, max_delivery_count: u32) -> bool {
        let expired: Vec<LeaseToken> = self
            .locked
            .iter()
            .filter(|(_, locked)| locked.locked_until <= now)
            .map(|(token, _)| *token)
            .collect();

        for token in &expired {
            if let Some(locked) = self.locked.remove(token) {
                debug!(message_id = %locked.stored.id, "lock expired");
                self.release(locked.stored, max_delivery_count);
            }
        }
        !expired.is_empty()
    }

    fn release(&mut self, stored: StoredMessage, max_delivery_count: u32) {
        if stored.delivery_count >= max_delivery_count {
            debug!(
                message_id = %stored.id,
                delivery_count = stored.delivery_count,
                "max delivery count reached, dead-lettering"
            );
            self.dead_letter(stored, MAX_DELIVERY_COUNT_EXCEEDED);
        } else {
            self.available.push_back(stored);
        }
    }

    fn dead_letter(&mut self, stored: StoredMessage, reason: &str) {
        self.dead_letters.push(DeadLetter {
            message_id: stored.id,
            payload: stored.payload,
            delivery_count: stored.delivery_count,
            reason: reason.to_string(),
        });
    }

    fn lock_batch(&mut self, max_count: usize, locked_until: Instant) -> Vec<Message> {
        let mut batch = Vec::with_capacity(max_count.min(self.available.len()));
        while batch.len() < max_count {
            let Some(mut stored) = self.available.pop_front() else {
                break;
            };
            stored.delivery_count += 1;
            let token = LeaseToken::generate();
            batch.push(Message::new(
                stored.id.clone(),
                stored.delivery_count,
                stored.payload.clone(),
                token,
                stored.enqueued_at,
            ));
            self.locked.insert(token, LockedMessage { stored, locked_until });
        }
        batch
    }

    fn take_locked(&mut self, message: &Message) -> Result<LockedMessage, TransportError> {
        self.ensure_open()?;
        self.locked
            .remove(&message.lease())
            .ok_or_else(|| TransportError::LeaseLost(message.id().clone()))
    }

    fn next_lock_expiry(&self) -> Option<Instant> {
        self.locked.values().map(|locked| locked.locked_until).min()
    }
}

/// In-memory `MessageSource`, used by tests and local runs.
pub struct InMemoryMessageSource {
    state: Mutex<SubscriptionState>,
    notify: Notify,
    lock_duration: Duration,
    max_delivery_count: u32,
}

impl InMemoryMessageSource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SubscriptionState::default()),
            notify: Notify::new(),
            lock_duration: DEFAULT_LOCK_DURATION,
            max_delivery_count: DEFAULT_MAX_DELIVERY_COUNT,
        }
    }

    pub fn with_lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = lock_duration;
        self
    }

    pub fn with_max_delivery_count(mut self, max_delivery_count: u32) -> Self {
        self.max_delivery_count = max_delivery_count.max(1);
        self
    }

    /// Publish a message to the subscription.
    pub async fn send(&self, payload: impl Into<Vec<u8>>) -> MessageId {
        let id = MessageId::generate();
        {
            let mut state = self.state.lock().await;
            state.available.push_back(StoredMessage {
                id: id.clone(),
                payload: payload.into(),
                enqueued_at: Utc::now(),
                delivery_count: 0,
            });
        }
        self.notify.notify_waiters();
        id
    }

    pub async fn send_json(&self, value: &serde_json::Value) -> MessageId {
        self.send(value.to_string().into_bytes()).await
    }

    pub async fn counts(&self) -> SourceCounts {
        let state = self.state.lock().await;
        SourceCounts {
            active: state.available.len(),
            locked: state.locked.len(),
            completed: state.completed,
            dead_lettered: state.dead_letters.len(),
        }
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.clone()
    }

    /// Total successful lock renewals.
    pub async fn lease_renewals(&self) -> u64 {
        self.state.lock().await.renewals
    }
}

impl Default for InMemoryMessageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageSource for InMemoryMessageSource {
    async fn receive_batch(
        &self,
        max_count: usize,
        max_wait: Duration,
    ) -> Result<Vec<Message>, TransportError> {
        let deadline = deadline_after(max_wait);
        loop {
            // Registered before the state check so a concurrent send is not missed.
            let notified = self.notify.notified();
            let wake_at = {
                let mut state = self.state.lock().await;
                state.ensure_open()?;
                let now = Instant::now();
                state.reclaim_expired(now, self.max_delivery_count);
                if !state.available.is_empty() {
                    return Ok(state.lock_batch(max_count, now + self.lock_duration));
                }
                if now >= deadline {
                    return Ok(Vec::new());
                }
                state
                    .next_lock_expiry()
                    .map_or(deadline, |expiry| expiry.min(deadline))
            };

            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn acknowledge(&self, message: &Message) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.reclaim_expired(Instant::now(), self.max_delivery_count);
        state.take_locked(message)?;
        state.completed += 1;
        Ok(())
    }

    async fn abandon(&self, message: &Message) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock().await;
            state.reclaim_expired(Instant::now(), self.max_delivery_count);
            let locked = state.take_locked(message)?;
            state.release(locked.stored, self.max_delivery_count);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter(&self, message: &Message, reason: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.reclaim_expired(Instant::now(), self.max_delivery_count);
        let locked = state.take_locked(message)?;
        state.dead_letter(locked.stored, reason);
        Ok(())
    }

    async fn renew_lease(&self, message: &Message) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;
        let now = Instant::now();
        state.reclaim_expired(now, self.max_delivery_count);
        let locked = state
            .locked
            .get_mut(&message.lease())
            .ok_or_else(|| TransportError::LeaseLost(message.id().clone()))?;
        locked.locked_until = now + self.lock_duration;
        state.renewals += 1;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.state.lock().await.closed = true;
        self.notify.notify_waiters();
        Ok(())
    }
}

fn deadline_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn receive_locks_and_counts_delivery() {
        let source = InMemoryMessageSource::new();
        let id = source.send("hello").await;

        let batch = source.receive_batch(10, WAIT).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id(), &id);
        assert_eq!(batch[0].delivery_count(), 1);
        assert_eq!(batch[0].text().unwrap(), "hello");

        let counts = source.counts().await;
        assert_eq!(counts.active, 0);
        assert_eq!(counts.locked, 1);
    }

    #[tokio::test]
    async fn receive_respects_max_count() {
        let source = InMemoryMessageSource::new();
        for i in 0..5 {
            source.send(format!("m{i}")).await;
        }
        let batch = source.receive_batch(3, WAIT).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(source.counts().await.active, 2);
    }

    #[tokio::test]
    async fn acknowledge_completes_message() {
        let source = InMemoryMessageSource::new();
        source.send("a").await;
        let batch = source.receive_batch(1, WAIT).await.unwrap();
        source.acknowledge(&batch[0]).await.unwrap();

        let counts = source.counts().await;
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.outstanding(), 0);
    }

    #[tokio::test]
    async fn settling_twice_reports_lost_lease() {
        let source = InMemoryMessageSource::new();
        source.send("a").await;
        let batch = source.receive_batch(1, WAIT).await.unwrap();
        source.acknowledge(&batch[0]).await.unwrap();

        let err = source.abandon(&batch[0]).await.unwrap_err();
        assert!(matches!(err, TransportError::LeaseLost(_)));
    }

    #[tokio::test]
    async fn abandon_redelivers_with_higher_delivery_count() {
        let source = InMemoryMessageSource::new();
        source.send("a").await;

        let first = source.receive_batch(1, WAIT).await.unwrap();
        source.abandon(&first[0]).await.unwrap();
        let second = source.receive_batch(1, WAIT).await.unwrap();

        assert_eq!(second[0].id(), first[0].id());
        assert_eq!(second[0].delivery_count(), 2);
        assert_ne!(second[0].lease(), first[0].lease());
    }

    #[tokio::test]
    async fn abandon_at_max_delivery_count_dead_letters() {
        let source = InMemoryMessageSource::new().with_max_delivery_count(2);
        let id = source.send("a").await;

        for _ in 0..2 {
            let batch = source.receive_batch(1, WAIT).await.unwrap();
            source.abandon(&batch[0]).await.unwrap();
        }

        let dead = source.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message_id, id);
        assert_eq!(dead[0].delivery_count, 2);
        assert_eq!(dead[0].reason, MAX_DELIVERY_COUNT_EXCEEDED);
        assert_eq!(source.counts().await.outstanding(), 0);
    }

    #[tokio::test]
    async fn dead_letter_keeps_reason() {
        let source = InMemoryMessageSource::new();
        source.send("bad").await;
        let batch = source.receive_batch(1, WAIT).await.unwrap();
        source.dead_letter(&batch[0], "unprocessable").await.unwrap();

        let dead = source.dead_letters().await;
        assert_eq!(dead[0].reason, "unprocessable");
        assert_eq!(dead[0].payload, b"bad".to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_receive_returns_after_max_wait() {
        let source = InMemoryMessageSource::new();
        let start = Instant::now();
        let batch = source
            .receive_batch(10, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn receive_wakes_on_send() {
        let source = Arc::new(InMemoryMessageSource::new());
        let receiver = tokio::spawn({
            let source = Arc::clone(&source);
            async move { source.receive_batch(10, Duration::from_secs(30)).await }
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        source.send("late").await;

        let batch = receiver.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lock_is_lost_and_message_redelivered() {
        let source = InMemoryMessageSource::new().with_lock_duration(Duration::from_secs(10));
        source.send("slow").await;
        let first = source.receive_batch(1, WAIT).await.unwrap();

        tokio::time::sleep(Duration::from_secs(11)).await;

        let err = source.acknowledge(&first[0]).await.unwrap_err();
        assert!(matches!(err, TransportError::LeaseLost(_)));
        let again = source.receive_batch(1, WAIT).await.unwrap();
        assert_eq!(again[0].delivery_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_keeps_lock_alive() {
        let source = InMemoryMessageSource::new().with_lock_duration(Duration::from_secs(10));
        source.send("slow").await;
        let batch = source.receive_batch(1, WAIT).await.unwrap();

        tokio::time::sleep(Duration::from_secs(8)).await;
        source.renew_lease(&batch[0]).await.unwrap();
        tokio::time::sleep(Duration::from_secs(8)).await;

        source.acknowledge(&batch[0]).await.unwrap();
        assert_eq!(source.lease_renewals().await, 1);
    }

    #[tokio::test]
    async fn closed_source_rejects_operations() {
        let source = InMemoryMessageSource::new();
        source.send("a").await;
        source.close().await.unwrap();

        let err = source.receive_batch(1, WAIT).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }
}
