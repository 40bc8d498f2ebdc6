//! Error reporting for work that producers never observe.
//!
//! Item failures don't propagate back to whoever enqueued the item. They are
//! handed to an [`ErrorSink`] injected at construction instead, so a failing
//! handler is never silent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::Error;
use crate::model::ProcessorId;

/// A single item's processing failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub processor_id: ProcessorId,
    /// Sequence number of the failing item.
    pub seq: u64,
    pub enqueued_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
    /// Rendered handler error, or the panic message.
    pub message: String,
    /// True when the handler panicked rather than returning an error.
    pub panicked: bool,
}

impl std::fmt::Display for ItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.panicked { "panicked" } else { "failed" };
        write!(f, "item #{} {kind}: {}", self.seq, self.message)
    }
}

/// Receives failures from the worker thread.
///
/// Called on the worker thread with no queue lock held, so implementations
/// may block briefly but should not enqueue back into the same processor
/// expecting the item to be handled before they return. A panic in
/// `item_failed` is fatal to the worker.
pub trait ErrorSink: Send + Sync {
    /// Called exactly once for every item whose handler failed.
    fn item_failed(&self, error: &ItemError);

    /// Called once if the worker dies. The same error is returned from
    /// `shutdown`.
    fn worker_failed(&self, processor_id: ProcessorId, error: &Error) {
        error!(processor = %processor_id, error = %error, "worker failed");
    }
}

/// Default sink: logs every failure through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn item_failed(&self, e: &ItemError) {
        error!(
            processor = %e.processor_id,
            seq = e.seq,
            panicked = e.panicked,
            error = %e.message,
            "item processing failed"
        );
    }
}

impl<F> ErrorSink for F
where
    F: Fn(&ItemError) + Send + Sync,
{
    fn item_failed(&self, error: &ItemError) {
        self(error)
    }
}
