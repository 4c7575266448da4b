//! Domain model (ids, messages, outcomes, retry policy, errors).

pub mod errors;
pub mod ids;
pub mod message;
pub mod outcome;
pub mod retry;

pub use errors::{ConfigError, DroverError, HandlerError, OutcomeParseError, TransportError};
pub use ids::{LeaseToken, MessageId};
pub use message::Message;
pub use outcome::Outcome;
pub use retry::RetryPolicy;
