//! Storage collaborators used by the ingestion gate and the compaction engine
//!
//! Both are expressed as traits so that the core algorithms only see the narrow
//! operation set they need. The bundled implementations keep their state in
//! memory; the segment store can additionally persist itself to a directory.

pub mod event_log;
pub mod segment_store;

pub use event_log::{EventLog, RingEventLog};
pub use segment_store::{
    BatchOutcome, BatchSummary, LocalSegmentStore, OpFailure, SegmentOp, SegmentSelector,
    SegmentStore,
};

use thiserror::Error;

/// Errors raised by a storage backend as a whole, as opposed to a single batch item.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
