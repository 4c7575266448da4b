//! Counters, gauges and status views.
//!
//! Only the `metrics` facade is used here; installing a recorder/exporter is
//! left to the binary.

use serde::{Deserialize, Serialize};

/// Messages settled by the consumer, labelled by `outcome`.
pub const MESSAGES_SETTLED: &str = "drover_messages_settled_total";

/// Downstream embedding responses, labelled by HTTP `status`
/// (or `timeout` / `error` when no response arrived).
pub const EMBEDDING_REQUESTS: &str = "drover_embedding_requests_total";

/// 1 while the circuit breaker is open, 0 otherwise.
pub const CIRCUIT_BREAKER_OPEN: &str = "drover_circuit_breaker_open";

/// Register descriptions with whatever recorder is installed.
pub fn describe_metrics() {
    metrics::describe_counter!(MESSAGES_SETTLED, "Messages settled by outcome");
    metrics::describe_counter!(
        EMBEDDING_REQUESTS,
        "Embedding requests by downstream response status"
    );
    metrics::describe_gauge!(CIRCUIT_BREAKER_OPEN, "Whether the circuit breaker is open");
}

/// Snapshot of a subscription's message states.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    /// Waiting to be received.
    pub active: usize,
    /// Received and locked by a consumer.
    pub locked: usize,
    pub completed: usize,
    pub dead_lettered: usize,
}

impl SourceCounts {
    /// Messages that have not reached a terminal state.
    pub fn outstanding(&self) -> usize {
        self.active + self.locked
    }
}
