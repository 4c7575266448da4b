//! Identifiers carried by received messages.
//!
//! `MessageId` is the transport's stable identifier and survives redelivery.
//! `LeaseToken` identifies one particular delivery (one lock) of a message, so
//! two deliveries of the same message never share a token.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Stable message identifier assigned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generate a fresh, time-sortable identifier.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle for a single delivery's lock on a message.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeaseToken(Ulid);

impl LeaseToken {
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lease-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_message_ids_are_unique() {
        let a = MessageId::generate();
        let b = MessageId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn lease_token_display_has_prefix() {
        let token = LeaseToken::generate();
        assert!(token.to_string().starts_with("lease-"));
    }

    #[test]
    fn message_id_serializes_as_plain_string() {
        let id = MessageId::new("msg-1");
        let s = serde_json::to_string(&id).unwrap();
        assert_eq!(s, "\"msg-1\"");
    }
}
