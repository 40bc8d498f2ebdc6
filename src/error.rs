//! Error types for taskq-rs.

use thiserror::Error;

use crate::model::ProcessorState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("queue is closed")]
    QueueClosed,

    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("processor already started")]
    AlreadyStarted,

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ProcessorState,
        to: ProcessorState,
    },

    #[error("worker failed: {0}")]
    FatalWorker(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
