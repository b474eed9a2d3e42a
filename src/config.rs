//! Runtime configuration shared by the server binary and the library components

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::DEFAULT_MAX_MESSAGE_BYTES;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Knobs consumed by the ingestion gate, the event log and the compactor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of samples in one history segment.
    pub max_segment_size: usize,
    /// Maximum allowed distance between a ping's timestamp and server time.
    pub clock_threshold_ms: i64,
    /// Period of the compaction timer.
    pub compaction_interval_ms: u64,
    /// Capacity of the raw event log before the oldest entries are evicted.
    pub log_capacity: usize,
    /// Directory the segment store persists to; in-memory only when unset.
    pub segment_dir: Option<PathBuf>,
    pub max_message_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_segment_size: 100,
            clock_threshold_ms: 60_000,
            compaction_interval_ms: 300_000,
            log_capacity: 10_000,
            segment_dir: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl Config {
    pub fn compaction_interval(&self) -> Duration {
        Duration::from_millis(self.compaction_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> ConfigError {
            ConfigError::Invalid { field, reason: reason.to_string() }
        }

        if self.max_segment_size == 0 {
            return Err(invalid("max_segment_size", "must be at least 1"));
        }
        if self.clock_threshold_ms < 0 {
            return Err(invalid("clock_threshold_ms", "must not be negative"));
        }
        if self.compaction_interval_ms == 0 {
            return Err(invalid("compaction_interval_ms", "must be at least 1"));
        }
        if self.log_capacity == 0 {
            return Err(invalid("log_capacity", "must be at least 1"));
        }
        if self.max_message_bytes == 0 {
            return Err(invalid("max_message_bytes", "must be at least 1"));
        }
        Ok(())
    }
}
