//! The consumer side of a processor.

use crate::model::WorkItem;

/// Processes one item at a time on the worker thread.
///
/// Returning `Err` (or panicking) marks only that item as failed; the worker
/// reports it to the error sink and moves on to the next item.
///
/// Any `FnMut(&WorkItem<T>) -> anyhow::Result<()>` closure is a handler.
pub trait ItemHandler<T>: Send + 'static {
    fn handle(&mut self, item: &WorkItem<T>) -> anyhow::Result<()>;
}

impl<T, F> ItemHandler<T> for F
where
    F: FnMut(&WorkItem<T>) -> anyhow::Result<()> + Send + 'static,
{
    fn handle(&mut self, item: &WorkItem<T>) -> anyhow::Result<()> {
        self(item)
    }
}
