//! Stand-in handler for local runs without a downstream service.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use drover_core::domain::{HandlerError, Message, Outcome};
use drover_core::ports::MessageHandler;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct TextPayload {
    text: String,
}

/// Fails the first `n` calls with `Retry`, then succeeds.
pub struct SimulatedHandler {
    remaining_failures: AtomicU32,
}

impl SimulatedHandler {
    pub fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl MessageHandler for SimulatedHandler {
    async fn process(&self, message: &Message) -> Result<Outcome, HandlerError> {
        let payload: TextPayload = match message.json() {
            Ok(payload) => payload,
            Err(err) => {
                warn!(message_id = %message.id(), error = %err, "undecodable payload");
                return Ok(Outcome::Drop);
            }
        };

        let failed = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| {
                left.checked_sub(1)
            });
        if let Ok(left) = failed {
            warn!(message_id = %message.id(), left, "intentional failure");
            return Ok(Outcome::Retry);
        }

        info!(message_id = %message.id(), text = %payload.text, "processed");
        Ok(Outcome::Success)
    }
}
