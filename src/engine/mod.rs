//! Queue processing engine: the processor, its dedicated worker, and the
//! handler seam items are delivered through.

pub mod handler;
pub mod processor;
mod worker;

pub use handler::ItemHandler;
pub use processor::TaskQueueProcessor;
