//! Implementations of the ports.

pub mod embedding;
pub mod memory_source;

pub use self::embedding::{EmbeddingConfig, EmbeddingHandler};
pub use self::memory_source::{DeadLetter, InMemoryMessageSource};
