//! Metric instrument factories for taskq-rs.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created from the `"taskq-rs"` meter. Without a
//! configured provider they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for taskq-rs instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("taskq-rs")
}

/// Counter: items accepted by `enqueue`.
pub fn items_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("taskq.items.enqueued")
        .with_description("Number of work items accepted into the queue")
        .build()
}

/// Counter: enqueue attempts refused.
/// Labels: `reason` ("closed" | "full").
pub fn items_rejected() -> Counter<u64> {
    meter()
        .u64_counter("taskq.items.rejected")
        .with_description("Number of enqueue attempts refused")
        .build()
}

/// Counter: items handed to the handler.
/// Labels: `result` ("ok" | "error" | "panic").
pub fn items_processed() -> Counter<u64> {
    meter()
        .u64_counter("taskq.items.processed")
        .with_description("Number of work items processed")
        .build()
}

/// Counter: items dropped without processing (queue reset or non-draining shutdown).
pub fn items_discarded() -> Counter<u64> {
    meter()
        .u64_counter("taskq.items.discarded")
        .with_description("Number of work items discarded unprocessed")
        .build()
}

/// Counter: processor lifecycle transitions.
/// Labels: `from`, `to`.
pub fn state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("taskq.processor.state_transitions")
        .with_description("Number of processor state transitions")
        .build()
}

/// Histogram: handler duration in milliseconds.
pub fn item_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskq.item.duration_ms")
        .with_description("Work item handler duration in milliseconds")
        .with_unit("ms")
        .build()
}
