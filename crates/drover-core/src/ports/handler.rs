//! MessageHandler port: the downstream work done for each message.

use async_trait::async_trait;

use crate::domain::{HandlerError, Message, Outcome};

/// Processes one message and classifies the result.
///
/// Implementations decide what the downstream response means: success maps
/// to `Outcome::Success`, rate limiting and transient server errors to
/// `Outcome::Retry`, permanent or validation failures to `Outcome::Drop`.
/// Returning an error is allowed; the retry wrapper treats it as `Retry`.
///
/// # Example
/// ```ignore
/// struct Echo;
///
/// #[async_trait]
/// impl MessageHandler for Echo {
///     async fn process(&self, message: &Message) -> Result<Outcome, HandlerError> {
///         println!("{:?}", message.text());
///         Ok(Outcome::Success)
///     }
/// }
/// ```
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn process(&self, message: &Message) -> Result<Outcome, HandlerError>;
}
