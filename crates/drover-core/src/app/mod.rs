//! App: the consumer loop and the pieces it is assembled from.
//!
//! - **LeaseRenewer**: keeps leases alive while messages are processed
//! - **RetryingHandler**: in-process retries with exponential backoff
//! - **CircuitBreaker**: stops full batches while the downstream is failing
//! - **Consumer**: receive → dispatch → settle → breaker, in a loop

pub mod breaker;
pub mod consumer;
pub mod lease;
pub mod retry;

pub use self::breaker::{BreakerState, CircuitBreaker};
pub use self::consumer::{Consumer, IterationReport, ReceiveMode};
pub use self::lease::{LeaseGuard, LeaseRenewer};
pub use self::retry::{RetryingHandler, with_retry};
