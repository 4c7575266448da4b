//! Ports: traits for the collaborators the consumer loop talks to.
//!
//! - `MessageSource`: the queue transport (receive, settle, renew)
//! - `MessageHandler`: the downstream processing call

pub mod handler;
pub mod message_source;

pub use self::handler::MessageHandler;
pub use self::message_source::MessageSource;
