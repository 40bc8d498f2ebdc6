//! Core data model.
//!
//! A work item is an opaque payload plus the metadata the processor stamps on
//! it at enqueue time. The processor itself moves through a small lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of work owned by the queue until the worker hands it to a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem<T> {
    /// Position in the processor's submission order. Starts at 1.
    seq: u64,

    enqueued_at: DateTime<Utc>,

    /// Arbitrary payload. The processor doesn't interpret it.
    payload: T,
}

impl<T> WorkItem<T> {
    pub(crate) fn new(seq: u64, payload: T) -> Self {
        Self {
            seq,
            enqueued_at: Utc::now(),
            payload,
        }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

// ---------------------------------------------------------------------------
// Processor identity
// ---------------------------------------------------------------------------

/// Newtype for processor instance IDs. Shows up in spans and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessorId(pub Uuid);

impl ProcessorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProcessorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorState {
    /// Constructed, accepting work, no worker yet.
    Created,
    /// Worker thread is consuming the queue.
    Running,
    /// Shutdown requested. No new work accepted.
    Draining,
    /// Worker has exited. Terminal.
    Stopped,
}

impl ProcessorState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: ProcessorState) -> bool {
        use ProcessorState::*;
        matches!(
            (self, to),
            (Created, Running)
                | (Created, Draining)   // shutdown before start
                | (Running, Draining)
                | (Running, Stopped)    // fatal worker error
                | (Draining, Stopped)
        )
    }

    /// Does this state still accept new work?
    pub fn accepts_work(self) -> bool {
        matches!(self, ProcessorState::Created | ProcessorState::Running)
    }

    pub fn is_terminal(self) -> bool {
        self == ProcessorState::Stopped
    }
}

impl std::fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessorState::Created => "created",
            ProcessorState::Running => "running",
            ProcessorState::Draining => "draining",
            ProcessorState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ProcessorState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ProcessorState::Created),
            "running" => Ok(ProcessorState::Running),
            "draining" => Ok(ProcessorState::Draining),
            "stopped" => Ok(ProcessorState::Stopped),
            other => Err(format!("unknown processor state: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Point-in-time counters for a processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorStats {
    /// Items accepted by `enqueue`.
    pub enqueued: u64,
    /// Enqueue attempts refused because the queue was closed or full.
    pub rejected: u64,
    /// Items whose handler returned `Ok`.
    pub succeeded: u64,
    /// Items whose handler returned an error or panicked.
    pub failed: u64,
    /// Items dropped by `clear` or a non-draining shutdown.
    pub discarded: u64,
}

impl ProcessorStats {
    /// Items handed to the handler, whatever the result.
    pub fn processed(&self) -> u64 {
        self.succeeded + self.failed
    }
}
