//! Per-processor settings, loadable from TOML.
//!
//! ```toml
//! [processor]
//! capacity = 1024
//! worker_name = "ingest-worker"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    processor: ProcessorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Maximum queued items. `None` means unbounded.
    pub capacity: Option<usize>,
    /// OS thread name given to the worker.
    pub worker_name: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            worker_name: "taskq-worker".to_string(),
        }
    }
}

impl ProcessorConfig {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Parse a `[processor]` table out of a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad processor config: {e}")))?;
        file.processor.validate()
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject a zero capacity or a blank worker name.
    pub fn validate(self) -> Result<Self> {
        if self.capacity == Some(0) {
            return Err(Error::Config("capacity must be greater than zero".to_string()));
        }
        if self.worker_name.trim().is_empty() {
            return Err(Error::Config("worker_name must not be empty".to_string()));
        }
        Ok(self)
    }
}
