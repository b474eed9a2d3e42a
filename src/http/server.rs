//! HTTP API Server for Waypoint
//!
//! Accepts binary location pings, serves compacted history and exposes manual
//! control over the compaction scheduler.

use crate::{
    compaction::{CompactionError, CompactionScheduler, CompactionStatus},
    core::{now_millis, CodecError, EventId, LocationHistory},
    ingestion::{IngestError, IngestionGate},
    storage::{SegmentStore, StorageError},
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

/// Upper bound on any request body; pings themselves are far smaller.
pub const MAX_BODY_BYTES: usize = 4 * 1024;

/// Generic success response
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub message: String,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response after accepting a ping
#[derive(Debug, Serialize, Deserialize)]
pub struct InsertResponse {
    pub message: String,
    /// `None` when the event log dropped the ping as a duplicate.
    pub id: Option<EventId>,
}

/// Optional inclusive time bounds for a history lookup
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

/// Response for a history lookup
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub vid: String,
    pub total: usize,
    pub segments: Vec<LocationHistory>,
}

/// Shared application state
pub struct AppState {
    pub gate: IngestionGate,
    pub segments: Arc<dyn SegmentStore>,
    pub scheduler: Arc<CompactionScheduler>,
}

/// Custom error type for API errors
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Codec(CodecError::Decode(e)) => {
                ApiError::BadRequest(format!("Failed to decode event: {}", e))
            }
            IngestError::Codec(e) => ApiError::BadRequest(format!("Invalid event: {}", e)),
            e @ IngestError::TimestampOutOfRange { .. } => ApiError::BadRequest(e.to_string()),
            IngestError::Storage(e) => e.into(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        error!(error = %err, "Storage failure while serving request");
        ApiError::InternalError(format!("Storage error: {}", err))
    }
}

impl From<CompactionError> for ApiError {
    fn from(err: CompactionError) -> Self {
        match err {
            e @ CompactionError::AlreadyRunning => ApiError::Conflict(e.to_string()),
            CompactionError::Storage(e) => e.into(),
        }
    }
}

/// Create the HTTP server with all routes
pub fn create_server(state: AppState) -> Router {
    let state = Arc::new(state);

    // Configure CORS
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/event/insert", post(insert_event))
        .route("/event/test", post(insert_test_event))
        .route("/api/history/:vid", get(get_history))
        .route("/api/compact", post(trigger_compaction))
        .route("/api/compaction/status", get(compaction_status))
        .route("/health", get(health_check))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(SuccessResponse { message: "Waypoint HTTP API is running".to_string() })
}

/// POST /event/insert - Decode a binary ping and append it to the event log
async fn insert_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<InsertResponse>, ApiError> {
    let id = state.gate.ingest(&body, now_millis()).await?;
    Ok(Json(inserted(id)))
}

/// POST /event/test - Insert the fixed health-check event
async fn insert_test_event(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InsertResponse>, ApiError> {
    let id = state.gate.insert_test_event(now_millis()).await?;
    Ok(Json(inserted(id)))
}

fn inserted(id: Option<EventId>) -> InsertResponse {
    let message = match id {
        Some(_) => "Event inserted",
        None => "Duplicate event ignored",
    };
    InsertResponse { message: message.to_string(), id }
}

/// GET /api/history/:vid - Segments of one vid overlapping `[from, to]`
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(vid): Path<String>,
    Query(range): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let from = range.from.unwrap_or(i64::MIN);
    let to = range.to.unwrap_or(i64::MAX);
    if from > to {
        return Err(ApiError::BadRequest(format!("from ({}) is after to ({})", from, to)));
    }

    let segments = state.segments.history(&vid, from, to).await?;
    Ok(Json(HistoryResponse { vid, total: segments.len(), segments }))
}

/// POST /api/compact - Start a compaction pass in the background
async fn trigger_compaction(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SuccessResponse>), ApiError> {
    state.scheduler.trigger()?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SuccessResponse { message: "Compaction started".to_string() }),
    ))
}

/// GET /api/compaction/status - Scheduler counters and the last report
async fn compaction_status(State(state): State<Arc<AppState>>) -> Json<CompactionStatus> {
    Json(state.scheduler.status())
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn start_server<F>(addr: &str, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_server(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Waypoint HTTP API listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}
