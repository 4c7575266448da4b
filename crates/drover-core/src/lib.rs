//! drover-core
//!
//! Building blocks for a resilient message-queue consumer.
//!
//! # Modules
//! - **domain**: domain model (ids, message, outcome, retry policy, errors)
//! - **ports**: traits for the transport and the downstream handler
//! - **app**: lease renewer, retry wrapper, circuit breaker, consumer loop
//! - **impls**: in-memory transport and the embeddings HTTP handler
//! - **config**: validated processing options
//! - **observability**: metric names and status views

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{BreakerState, Consumer, IterationReport};
pub use config::{ProcessingOptions, ProcessingOptionsBuilder};
pub use domain::{DroverError, HandlerError, Message, MessageId, Outcome, RetryPolicy};
pub use ports::{MessageHandler, MessageSource};
