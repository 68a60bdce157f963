//! Job store metrics.

use std::time::Instant;

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Store operations by operation and outcome.
    pub const OPERATIONS_TOTAL: &str = "slidecast_db_operations_total";

    /// Status writes refused by the state machine.
    pub const REJECTED_TRANSITIONS_TOTAL: &str = "slidecast_db_rejected_transitions_total";

    /// Operation latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "slidecast_db_latency_seconds";
}

/// Record a completed store operation.
pub fn record_operation(operation: &'static str, ok: bool, started: Instant) {
    counter!(
        names::OPERATIONS_TOTAL,
        "operation" => operation,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);

    histogram!(names::LATENCY_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

/// Record a status write refused by the state machine.
pub fn record_rejected_transition(from: &str, to: &str) {
    counter!(
        names::REJECTED_TRANSITIONS_TOTAL,
        "from" => from.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}
