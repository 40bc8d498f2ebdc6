//! The task queue processor: producers enqueue from anywhere, one dedicated
//! worker thread drains the queue in order until shutdown.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use opentelemetry::KeyValue;
use tracing::{debug, info, warn};

use crate::config::ProcessorConfig;
use crate::error::{Error, Result};
use crate::model::{ProcessorId, ProcessorState, ProcessorStats, WorkItem};
use crate::sink::{ErrorSink, TracingSink};

use super::handler::ItemHandler;
use super::worker::{self, Shared};

/// Where the worker is in its life, from the handle's point of view.
enum WorkerSlot<T> {
    /// Not spawned yet. Holds the handler until it moves to the thread.
    Idle(Box<dyn ItemHandler<T>>),
    Running(JoinHandle<()>),
    Joined,
}

/// A FIFO queue drained by a single dedicated worker thread.
///
/// Share it between producers with an `Arc`. `enqueue` never waits for
/// processing; `shutdown` is the only call that blocks, and only until the
/// worker has exited.
///
/// # Example
/// ```no_run
/// use taskq_rs::engine::TaskQueueProcessor;
/// use taskq_rs::model::WorkItem;
///
/// let processor = TaskQueueProcessor::new(|item: &WorkItem<String>| -> anyhow::Result<()> {
///     println!("#{}: {}", item.seq(), item.payload());
///     Ok(())
/// });
/// processor.enqueue("hello".to_string()).unwrap();
/// processor.start_processing().unwrap();
/// processor.shutdown(true).unwrap();
/// ```
pub struct TaskQueueProcessor<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    /// Serializes start and shutdown. Always taken before the queue lock.
    worker: Mutex<WorkerSlot<T>>,
    worker_name: String,
}

impl<T: Send + 'static> TaskQueueProcessor<T> {
    /// Unbounded processor that logs failures through `tracing`.
    pub fn new(handler: impl ItemHandler<T>) -> Self {
        Self::build(ProcessorConfig::default(), handler, TracingSink)
    }

    /// Fails with [`Error::Config`] for a zero capacity or a blank worker name.
    pub fn with_config(
        config: ProcessorConfig,
        handler: impl ItemHandler<T>,
        sink: impl ErrorSink + 'static,
    ) -> Result<Self> {
        Ok(Self::build(config.validate()?, handler, sink))
    }

    fn build(
        config: ProcessorConfig,
        handler: impl ItemHandler<T>,
        sink: impl ErrorSink + 'static,
    ) -> Self {
        let id = ProcessorId::new();
        debug!(
            processor = %id,
            capacity = ?config.capacity,
            worker = %config.worker_name,
            "processor created"
        );
        Self {
            shared: Arc::new(Shared::new(id, config.capacity, Arc::new(sink))),
            worker: Mutex::new(WorkerSlot::Idle(Box::new(handler))),
            worker_name: config.worker_name,
        }
    }

    pub fn id(&self) -> ProcessorId {
        self.shared.id
    }

    pub fn state(&self) -> ProcessorState {
        self.shared.lock().state
    }

    /// Items waiting for the worker. Excludes the one in hand.
    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> Option<usize> {
        self.shared.capacity
    }

    pub fn stats(&self) -> ProcessorStats {
        self.shared.counters.snapshot()
    }

    /// Append `payload` to the tail of the queue and return its sequence number.
    ///
    /// Never waits for processing. Fails with [`Error::QueueClosed`] once
    /// shutdown has begun, or [`Error::QueueFull`] when a bounded queue is at
    /// capacity.
    pub fn enqueue(&self, payload: T) -> Result<u64> {
        let shared = &self.shared;
        let mut inner = shared.lock();

        if !inner.state.accepts_work() {
            drop(inner);
            self.reject("closed");
            return Err(Error::QueueClosed);
        }
        if let Some(capacity) = shared.capacity {
            if inner.items.len() >= capacity {
                drop(inner);
                self.reject("full");
                return Err(Error::QueueFull { capacity });
            }
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.items.push_back(WorkItem::new(seq, payload));
        drop(inner);

        shared.available.notify_one();
        shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        shared.instruments.enqueued.add(1, &[]);
        debug!(processor = %shared.id, seq, "item enqueued");
        Ok(seq)
    }

    fn reject(&self, reason: &'static str) {
        self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
        self.shared
            .instruments
            .rejected
            .add(1, &[KeyValue::new("reason", reason)]);
    }

    /// Spawn the dedicated worker thread.
    ///
    /// Only valid in `Created`; every later call fails with
    /// [`Error::AlreadyStarted`], including after shutdown.
    pub fn start_processing(&self) -> Result<()> {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        {
            let mut inner = self.shared.lock();
            if inner.state != ProcessorState::Created {
                return Err(Error::AlreadyStarted);
            }
            self.shared.transition(&mut inner, ProcessorState::Running)?;
        }
        self.spawn_into(&mut slot)?;
        info!(processor = %self.shared.id, worker = %self.worker_name, "processing started");
        Ok(())
    }

    /// Move the handler onto a fresh worker thread.
    fn spawn_into(&self, slot: &mut WorkerSlot<T>) -> Result<()> {
        let WorkerSlot::Idle(handler) = std::mem::replace(slot, WorkerSlot::Joined) else {
            return Err(Error::AlreadyStarted);
        };
        match worker::spawn(&self.worker_name, Arc::clone(&self.shared), handler) {
            Ok(handle) => {
                *slot = WorkerSlot::Running(handle);
                Ok(())
            }
            Err(e) => {
                let mut inner = self.shared.lock();
                inner.fatal = Some(format!("failed to spawn worker thread: {e}"));
                self.shared.discard_all(&mut inner);
                self.shared.stop(&mut inner);
                Err(Error::Io(e))
            }
        }
    }

    /// Stop accepting work and wait for the worker to exit.
    ///
    /// With `drain`, everything already queued is processed first. Without
    /// it the worker finishes the item in hand and the rest is discarded
    /// without being reported as failures.
    ///
    /// A processor that was never started is drained on a freshly spawned
    /// worker, or simply emptied when `drain` is false. Calling this again
    /// (or concurrently) waits for the first call and returns the same
    /// outcome. Returns [`Error::FatalWorker`] if the worker died.
    pub fn shutdown(&self, drain: bool) -> Result<()> {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);

        let spawn_to_drain = {
            let mut inner = self.shared.lock();
            if inner.state.accepts_work() {
                self.shared.transition(&mut inner, ProcessorState::Draining)?;
                info!(
                    processor = %self.shared.id,
                    drain,
                    queued = inner.items.len(),
                    "shutdown requested"
                );
                if !drain {
                    inner.discard = true;
                }
            }
            let never_started = matches!(*slot, WorkerSlot::Idle(_));
            if never_started && (!drain || inner.items.is_empty()) {
                self.shared.discard_all(&mut inner);
                self.shared.stop(&mut inner);
            }
            never_started && inner.state == ProcessorState::Draining
        };
        self.shared.available.notify_all();

        if spawn_to_drain {
            self.spawn_into(&mut slot)?;
        }

        if let WorkerSlot::Running(handle) = std::mem::replace(&mut *slot, WorkerSlot::Joined) {
            if handle.join().is_err() {
                let mut inner = self.shared.lock();
                let message = "worker thread panicked".to_string();
                warn!(processor = %self.shared.id, "{message}");
                inner.fatal.get_or_insert(message);
                self.shared.discard_all(&mut inner);
                self.shared.stop(&mut inner);
            }
        }

        match self.shared.lock().fatal.clone() {
            Some(message) => Err(Error::FatalWorker(message)),
            None => Ok(()),
        }
    }

    /// Drop every queued item without processing it. Returns how many went.
    ///
    /// The item currently in the worker's hands is unaffected.
    pub fn clear(&self) -> usize {
        let mut inner = self.shared.lock();
        let n = self.shared.discard_all(&mut inner);
        if n > 0 {
            info!(processor = %self.shared.id, discarded = n, "queue cleared");
        }
        n
    }
}

impl<T: Send + 'static> Drop for TaskQueueProcessor<T> {
    /// Non-draining shutdown. A processor that never started just has its
    /// queue discarded.
    fn drop(&mut self) {
        let joined = matches!(
            *self.worker.get_mut().unwrap_or_else(PoisonError::into_inner),
            WorkerSlot::Joined
        );
        if !joined {
            if let Err(e) = self.shutdown(false) {
                warn!(processor = %self.shared.id, error = %e, "shutdown on drop failed");
            }
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for TaskQueueProcessor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueueProcessor")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("queued", &self.len())
            .field("capacity", &self.shared.capacity)
            .field("worker_name", &self.worker_name)
            .finish()
    }
}
