//! # taskq-rs
//!
//! A long-running background task queue with graceful draining.
//!
//! Producers enqueue from any thread or async task without waiting on
//! processing. A single worker on its own OS thread, never on a shared
//! bounded pool, drains the queue in FIFO order until shutdown. Item
//! failures go to an injected error sink; lifecycle failures come back from
//! `shutdown`. Observability is `tracing` plus OpenTelemetry.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod sink;
pub mod telemetry;
