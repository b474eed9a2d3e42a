//! HTTP API module for Waypoint
//!
//! Provides REST endpoints for:
//! - Location ping ingestion and health-check insertion
//! - Per-vid history retrieval
//! - Compaction trigger and status

pub mod server;

pub use server::{
    create_server, start_server, AppState, ErrorResponse, HistoryQuery, HistoryResponse,
    InsertResponse, SuccessResponse, MAX_BODY_BYTES,
};
