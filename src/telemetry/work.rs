//! Work item span helpers.
//!
//! Provides span creation and state-transition recording for items flowing
//! through a processor.

use tracing::Span;

use crate::model::{ProcessorId, ProcessorState};

/// Start a span for one item's trip through the handler.
///
/// The `item.result` field is declared empty and filled in by
/// [`record_item_result`].
pub fn start_item_span(processor_id: ProcessorId, seq: u64) -> Span {
    tracing::info_span!(
        "queue.item",
        "processor.id" = %processor_id,
        "item.seq" = seq,
        "item.result" = tracing::field::Empty,
    )
}

/// Record how the handler finished ("ok" | "error" | "panic").
pub fn record_item_result(span: &Span, result: &str) {
    span.record("item.result", result);
}

/// Emit a processor state transition as an `info` event.
pub fn record_state_transition(processor_id: ProcessorId, from: ProcessorState, to: ProcessorState) {
    tracing::info!(
        processor = %processor_id,
        from = %from,
        to = %to,
        "state_transition"
    );
}
