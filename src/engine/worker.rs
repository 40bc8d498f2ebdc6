//! Shared queue state and the dedicated worker loop.
//!
//! The worker owns an OS thread for its whole life. It never runs on the
//! tokio runtime or its blocking pool, so a consumer that lives as long as
//! the process can't starve short-lived work scheduled there.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::Utc;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::{ProcessorId, ProcessorState, ProcessorStats, WorkItem};
use crate::sink::{ErrorSink, ItemError};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_item_result, record_state_transition, start_item_span};

use super::handler::ItemHandler;

/// Everything guarded by the queue lock.
pub(crate) struct Inner<T> {
    pub items: VecDeque<WorkItem<T>>,
    pub state: ProcessorState,
    pub next_seq: u64,
    /// Set by a non-draining shutdown: drop whatever is still queued.
    pub discard: bool,
    /// Message of the fatal error that stopped the worker, if any.
    pub fatal: Option<String>,
}

/// State shared between the processor handle and its worker thread.
pub(crate) struct Shared<T> {
    pub id: ProcessorId,
    pub capacity: Option<usize>,
    pub queue: Mutex<Inner<T>>,
    /// Signalled on enqueue and on shutdown.
    pub available: Condvar,
    pub counters: Counters,
    pub instruments: Instruments,
    pub sink: Arc<dyn ErrorSink>,
}

impl<T> Shared<T> {
    pub fn new(id: ProcessorId, capacity: Option<usize>, sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            id,
            capacity,
            queue: Mutex::new(Inner {
                items: VecDeque::new(),
                state: ProcessorState::Created,
                next_seq: 0,
                discard: false,
                fatal: None,
            }),
            available: Condvar::new(),
            counters: Counters::default(),
            instruments: Instruments::new(),
            sink,
        }
    }

    /// Lock for bookkeeping outside the worker loop.
    ///
    /// Nothing panics while holding this lock, so a poisoned lock only means
    /// the worker's wait is broken. The worker records that as fatal and the
    /// state flag stays meaningful, so callers read through the poison.
    pub fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `to`, enforcing the lifecycle.
    pub fn transition(&self, inner: &mut Inner<T>, to: ProcessorState) -> Result<()> {
        let from = inner.state;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { from, to });
        }
        inner.state = to;
        record_state_transition(self.id, from, to);
        self.instruments.state_transitions.add(
            1,
            &[
                KeyValue::new("from", from.to_string()),
                KeyValue::new("to", to.to_string()),
            ],
        );
        Ok(())
    }

    /// Drop everything still queued. Returns how many items went.
    pub fn discard_all(&self, inner: &mut Inner<T>) -> usize {
        let n = inner.items.len();
        inner.items.clear();
        if n > 0 {
            self.counters.discarded.fetch_add(n as u64, Ordering::Relaxed);
            self.instruments.discarded.add(n as u64, &[]);
        }
        n
    }

    /// Walk whatever state we're in to `Stopped`.
    pub fn stop(&self, inner: &mut Inner<T>) {
        let path: &[ProcessorState] = match inner.state {
            ProcessorState::Created => &[ProcessorState::Draining, ProcessorState::Stopped],
            ProcessorState::Running | ProcessorState::Draining => &[ProcessorState::Stopped],
            ProcessorState::Stopped => &[],
        };
        for &to in path {
            if let Err(e) = self.transition(inner, to) {
                warn!(processor = %self.id, error = %e, "illegal lifecycle step while stopping");
            }
        }
        debug_assert_eq!(inner.state, ProcessorState::Stopped);
    }
}

#[derive(Default)]
pub(crate) struct Counters {
    pub enqueued: AtomicU64,
    pub rejected: AtomicU64,
    pub succeeded: AtomicU64,
    pub failed: AtomicU64,
    pub discarded: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> ProcessorStats {
        ProcessorStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// OTel instruments, built once per processor.
pub(crate) struct Instruments {
    pub enqueued: Counter<u64>,
    pub rejected: Counter<u64>,
    pub processed: Counter<u64>,
    pub discarded: Counter<u64>,
    pub state_transitions: Counter<u64>,
    pub duration_ms: Histogram<f64>,
}

impl Instruments {
    fn new() -> Self {
        Self {
            enqueued: metrics::items_enqueued(),
            rejected: metrics::items_rejected(),
            processed: metrics::items_processed(),
            discarded: metrics::items_discarded(),
            state_transitions: metrics::state_transitions(),
            duration_ms: metrics::item_duration_ms(),
        }
    }
}

/// Spawn the worker on its own named OS thread.
pub(crate) fn spawn<T: Send + 'static>(
    name: &str,
    shared: Arc<Shared<T>>,
    handler: Box<dyn ItemHandler<T>>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run(shared, handler))
}

fn run<T: Send + 'static>(shared: Arc<Shared<T>>, mut handler: Box<dyn ItemHandler<T>>) {
    info!(processor = %shared.id, "worker started");

    // Handler panics are caught per item. Anything that still unwinds out
    // here (a panicking sink, say) ends the worker for good.
    let outcome = catch_unwind(AssertUnwindSafe(|| process_queue(&shared, handler.as_mut())))
        .unwrap_or_else(|panic| {
            Err(Error::FatalWorker(format!(
                "worker panicked: {}",
                panic_message(panic.as_ref())
            )))
        });

    match outcome {
        Ok(()) => info!(processor = %shared.id, "worker stopped"),
        Err(e) => {
            let mut inner = shared.lock();
            inner.fatal = Some(e.to_string());
            let discarded = shared.discard_all(&mut inner);
            shared.stop(&mut inner);
            drop(inner);
            error!(processor = %shared.id, error = %e, discarded, "worker failed");
            let reported = catch_unwind(AssertUnwindSafe(|| {
                shared.sink.worker_failed(shared.id, &e)
            }));
            if reported.is_err() {
                warn!(processor = %shared.id, "error sink panicked reporting a fatal error");
            }
        }
    }
}

/// Pop and handle items until shutdown. `Err` means the wait itself broke.
fn process_queue<T: Send + 'static>(
    shared: &Shared<T>,
    handler: &mut dyn ItemHandler<T>,
) -> Result<()> {
    loop {
        let Some(item) = next_item(shared)? else {
            return Ok(());
        };
        process_item(shared, handler, item);
    }
}

/// Block until there is an item to hand out or the processor should stop.
///
/// The only suspension point in the worker. When returning `None` the
/// processor has already been moved to `Stopped`.
fn next_item<T: Send + 'static>(shared: &Shared<T>) -> Result<Option<WorkItem<T>>> {
    let mut inner = shared.queue.lock().map_err(wait_failed)?;
    loop {
        if inner.discard {
            let n = shared.discard_all(&mut inner);
            debug!(processor = %shared.id, discarded = n, "discarding remaining items");
        }
        if let Some(item) = inner.items.pop_front() {
            return Ok(Some(item));
        }
        if inner.state != ProcessorState::Running {
            shared.stop(&mut inner);
            return Ok(None);
        }
        inner = shared.available.wait(inner).map_err(wait_failed)?;
    }
}

fn wait_failed<G>(e: PoisonError<G>) -> Error {
    Error::FatalWorker(format!("queue wait failed: {e}"))
}

/// Run one item through the handler with no lock held.
fn process_item<T: Send + 'static>(
    shared: &Shared<T>,
    handler: &mut dyn ItemHandler<T>,
    item: WorkItem<T>,
) {
    let span = start_item_span(shared.id, item.seq());
    let _enter = span.enter();
    let start = Instant::now();

    let outcome = match catch_unwind(AssertUnwindSafe(|| handler.handle(&item))) {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some((format!("{e:#}"), false)),
        Err(panic) => Some((panic_message(panic.as_ref()), true)),
    };

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    let result = match outcome {
        None => "ok",
        Some((_, false)) => "error",
        Some((_, true)) => "panic",
    };
    record_item_result(&span, result);
    shared.instruments.duration_ms.record(duration_ms, &[]);
    shared
        .instruments
        .processed
        .add(1, &[KeyValue::new("result", result)]);

    match outcome {
        None => {
            shared.counters.succeeded.fetch_add(1, Ordering::Relaxed);
            debug!(seq = item.seq(), duration_ms, "item processed");
        }
        Some((message, panicked)) => {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            shared.sink.item_failed(&ItemError {
                processor_id: shared.id,
                seq: item.seq(),
                enqueued_at: item.enqueued_at(),
                failed_at: Utc::now(),
                message,
                panicked,
            });
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::TracingSink;

    fn shared() -> Shared<u32> {
        Shared::new(ProcessorId::new(), None, Arc::new(TracingSink))
    }

    #[test]
    fn stop_reaches_stopped_from_every_state() {
        for from in [
            ProcessorState::Created,
            ProcessorState::Running,
            ProcessorState::Draining,
            ProcessorState::Stopped,
        ] {
            let shared = shared();
            let mut inner = shared.lock();
            inner.state = from;
            shared.stop(&mut inner);
            assert_eq!(inner.state, ProcessorState::Stopped, "stopping from {from}");
        }
    }

    #[test]
    fn stop_records_each_step_from_created() {
        let shared = shared();
        let mut inner = shared.lock();
        inner.items.push_back(WorkItem::new(1, 7));
        shared.stop(&mut inner);
        assert_eq!(inner.state, ProcessorState::Stopped);
        // Stopping does not touch the queue; discarding is a separate step.
        assert_eq!(inner.items.len(), 1);
        assert_eq!(shared.discard_all(&mut inner), 1);
        assert_eq!(shared.counters.snapshot().discarded, 1);
    }

    #[test]
    fn transition_refuses_to_leave_stopped() {
        let shared = shared();
        let mut inner = shared.lock();
        shared.stop(&mut inner);
        let err = shared
            .transition(&mut inner, ProcessorState::Running)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: ProcessorState::Stopped,
                to: ProcessorState::Running
            }
        ));
    }
}
