//! Error types.
//!
//! - `HandlerError`: raised by a `MessageHandler`; never escapes the retry wrapper.
//! - `TransportError`: raised by a `MessageSource`; fatal to the consumer loop
//!   except during lease renewal.
//! - `ConfigError`: invalid processing options.
//! - `DroverError`: what `Consumer::run` reports to the process.

use thiserror::Error;

use super::MessageId;

#[derive(Debug, Error)]
pub enum HandlerError {
    /// Rate limiting, timeouts, 5xx responses and the like.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The message can never be processed.
    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("unexpected handler error: {0}")]
    Unexpected(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failure: {0}")]
    Connection(String),

    #[error("lease lost for message {0}")]
    LeaseLost(MessageId),

    #[error("message source is closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: u64,
        value: u64,
    },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("backoff multiplier must be a finite number >= 1.0, got {0}")]
    InvalidMultiplier(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid message outcome: {0:?}")]
pub struct OutcomeParseError(pub String);

#[derive(Debug, Error)]
pub enum DroverError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_converts_into_drover_error() {
        let err: DroverError = TransportError::LeaseLost(MessageId::new("m-9")).into();
        assert!(matches!(err, DroverError::Transport(TransportError::LeaseLost(_))));
        assert_eq!(err.to_string(), "lease lost for message m-9");
    }

    #[test]
    fn config_error_message_names_the_field() {
        let err = ConfigError::TooSmall {
            field: "max_messages_per_batch",
            min: 1,
            value: 0,
        };
        assert_eq!(
            err.to_string(),
            "max_messages_per_batch must be at least 1, got 0"
        );
    }
}
