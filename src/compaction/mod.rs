//! Compaction of the raw event log into per-vid history segments
//!
//! - [`paginate`] bounds a run of samples into segment-sized pages.
//! - [`engine::CompactionEngine`] performs a single snapshot, merge, commit and
//!   advance pass.
//! - [`scheduler::CompactionScheduler`] runs the engine on a timer and keeps at
//!   most one pass in flight.

pub mod engine;
pub mod paginate;
pub mod scheduler;

pub use engine::{CompactionEngine, CompactionReport};
pub use paginate::paginate;
pub use scheduler::{CompactionScheduler, CompactionStatus};

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("compaction storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("a compaction run is already in progress")]
    AlreadyRunning,
}
