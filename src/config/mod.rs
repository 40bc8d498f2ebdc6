//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if a value is present but malformed.
//! Processor tuning can also come from a TOML file; see [`ProcessorConfig`].

pub mod processor;

pub use processor::ProcessorConfig;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// `None` means unbounded.
    pub queue_capacity: Option<usize>,
    pub worker_name: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            queue_capacity: optional_capacity("TASKQ_QUEUE_CAPACITY")?,
            worker_name: std::env::var("TASKQ_WORKER_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        })
    }

    /// Overlay the env-provided processor settings onto `base`.
    pub fn apply_to(&self, mut base: ProcessorConfig) -> ProcessorConfig {
        if let Some(capacity) = self.queue_capacity {
            base.capacity = Some(capacity);
        }
        if let Some(ref name) = self.worker_name {
            base.worker_name = name.clone();
        }
        base
    }
}

fn optional_capacity(name: &str) -> Result<Option<usize>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    let capacity: usize = raw
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{name}={raw:?} is not a valid capacity: {e}")))?;
    if capacity == 0 {
        return Err(Error::Config(format!("{name} must be greater than zero")));
    }
    Ok(Some(capacity))
}
