//! Received message: payload plus the delivery metadata needed to settle it.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use super::{LeaseToken, MessageId};

/// A message as handed out by a `MessageSource`.
///
/// The transport owns the message; the consumer only holds this value while
/// the delivery is being processed. `delivery_count` is maintained by the
/// transport (1 on first delivery) and is read-only here.
#[derive(Debug, Clone)]
pub struct Message {
    id: MessageId,
    delivery_count: u32,
    payload: Vec<u8>,
    lease: LeaseToken,
    enqueued_at: DateTime<Utc>,
}

impl Message {
    pub fn new(
        id: MessageId,
        delivery_count: u32,
        payload: Vec<u8>,
        lease: LeaseToken,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            delivery_count,
            payload,
            lease,
            enqueued_at,
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn lease(&self) -> LeaseToken {
        self.lease
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    /// Payload as UTF-8 text.
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.payload)
    }

    /// Decode the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}
