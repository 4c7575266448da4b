//! Lease renewal for messages that are still being processed.
//!
//! Each registered message gets a background task that calls
//! `MessageSource::renew_lease` every `interval` until the message is settled
//! (its `LeaseGuard` is released or dropped) or `max_duration` has elapsed
//! since registration. After that the lease is left to expire, which makes
//! the transport redeliver the message.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ProcessingOptions;
use crate::domain::{LeaseToken, Message};
use crate::ports::MessageSource;

type LeaseTasks = Arc<Mutex<HashMap<LeaseToken, JoinHandle<()>>>>;

/// Keeps message leases alive in the background.
pub struct LeaseRenewer {
    source: Arc<dyn MessageSource>,
    interval: Duration,
    max_duration: Duration,
    leases: LeaseTasks,
}

impl LeaseRenewer {
    pub fn new(source: Arc<dyn MessageSource>, interval: Duration, max_duration: Duration) -> Self {
        Self {
            source,
            interval,
            max_duration,
            leases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_options(source: Arc<dyn MessageSource>, options: &ProcessingOptions) -> Self {
        Self::new(
            source,
            options.lease_renewal_interval(),
            options.max_lease_renewal_duration(),
        )
    }

    /// Start renewing `message`'s lease. Renewal stops when the guard goes away.
    ///
    /// Must be called from within a tokio runtime.
    pub fn register(&self, message: &Message) -> LeaseGuard {
        let token = message.lease();
        let task = tokio::spawn(renew_until_expired(
            Arc::clone(&self.source),
            message.clone(),
            self.interval,
            Instant::now() + self.max_duration,
        ));

        if let Some(previous) = self.leases.lock().insert(token, task) {
            previous.abort();
        }

        LeaseGuard {
            token,
            leases: Arc::clone(&self.leases),
        }
    }

    /// Messages registered and not yet released.
    pub fn in_flight(&self) -> usize {
        self.leases.lock().len()
    }

    /// Stop every renewal task.
    pub fn shutdown(&self) {
        let tasks: Vec<_> = self.leases.lock().drain().collect();
        if !tasks.is_empty() {
            debug!(count = tasks.len(), "stopping lease renewals");
        }
        for (_, task) in tasks {
            task.abort();
        }
    }
}

impl Drop for LeaseRenewer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle tying a renewal task to the lifetime of a message's processing.
#[must_use = "dropping the guard stops lease renewal immediately"]
pub struct LeaseGuard {
    token: LeaseToken,
    leases: LeaseTasks,
}

impl LeaseGuard {
    pub fn token(&self) -> LeaseToken {
        self.token
    }

    /// Stop renewing. Same as dropping the guard.
    pub fn release(self) {}
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Some(task) = self.leases.lock().remove(&self.token) {
            task.abort();
        }
    }
}

async fn renew_until_expired(
    source: Arc<dyn MessageSource>,
    message: Message,
    interval: Duration,
    deadline: Instant,
) {
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining <= interval {
            debug!(
                message_id = %message.id(),
                "max lease renewal duration reached, letting lease expire"
            );
            return;
        }

        tokio::time::sleep(interval).await;

        match source.renew_lease(&message).await {
            Ok(()) => debug!(message_id = %message.id(), "lease renewed"),
            Err(err) => {
                warn!(message_id = %message.id(), error = %err, "lease renewal failed");
                return;
            }
        }
    }
}
