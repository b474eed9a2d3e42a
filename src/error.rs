//! Error types and result definitions

use thiserror::Error;

use crate::compaction::CompactionError;
use crate::config::ConfigError;
use crate::core::CodecError;
use crate::ingestion::IngestError;
use crate::storage::StorageError;

/// Result type alias for Waypoint operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Waypoint
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Compaction error: {0}")]
    Compaction(#[from] CompactionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
