//! Ingestion gate: the per-request path from wire bytes to the raw event log

pub mod gate;

pub use gate::{IngestError, IngestionGate, TEST_EVENT_VID};
