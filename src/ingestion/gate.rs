use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::core::{decode_with_limit, CodecError, EventId, LocationEvent, Position};
use crate::storage::{EventLog, StorageError};

/// Vid used by the health-check insertion path.
pub const TEST_EVENT_VID: &str = "N-00-000";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("timestamp {timestamp} is more than {threshold_ms} ms away from server time {now}")]
    TimestampOutOfRange { timestamp: i64, now: i64, threshold_ms: i64 },

    #[error("event log failure: {0}")]
    Storage(#[from] StorageError),
}

/// Validates pings against the server clock and appends them to the event log.
///
/// Holds no per-request state; every call is independent and the log is the
/// only point where concurrent requests meet.
#[derive(Clone)]
pub struct IngestionGate {
    events: Arc<dyn EventLog>,
    clock_threshold_ms: i64,
    max_message_bytes: usize,
}

impl IngestionGate {
    pub fn new(events: Arc<dyn EventLog>, clock_threshold_ms: i64, max_message_bytes: usize) -> Self {
        Self { events, clock_threshold_ms, max_message_bytes }
    }

    pub fn clock_threshold_ms(&self) -> i64 {
        self.clock_threshold_ms
    }

    /// Appends an already decoded event.
    ///
    /// Rejects the event when its timestamp is further than the clock threshold
    /// from `now`, unless `force` is set. Returns `Ok(None)` when the log
    /// dropped the event as a duplicate of an earlier `(vid, timestamp)`.
    pub async fn accept(
        &self,
        event: LocationEvent,
        now: i64,
        force: bool,
    ) -> Result<Option<EventId>, IngestError> {
        if !force && now.abs_diff(event.timestamp) > self.clock_threshold_ms.unsigned_abs() {
            debug!(vid = %event.vid, timestamp = event.timestamp, now = now, "Rejecting skewed ping");
            return Err(IngestError::TimestampOutOfRange {
                timestamp: event.timestamp,
                now,
                threshold_ms: self.clock_threshold_ms,
            });
        }

        let id = self.events.append(event).await?;
        if id.is_none() {
            debug!("Duplicate ping dropped by the event log");
        }
        Ok(id)
    }

    /// Decodes a wire message and accepts it.
    pub async fn ingest(&self, payload: &[u8], now: i64) -> Result<Option<EventId>, IngestError> {
        let event = decode_with_limit(payload, self.max_message_bytes).map_err(|e| {
            debug!(error = %e, len = payload.len(), "Rejecting undecodable ping");
            e
        })?;
        self.accept(event, now, false).await
    }

    /// Inserts the fixed health-check event at null island, skipping the codec.
    pub async fn insert_test_event(&self, now: i64) -> Result<Option<EventId>, IngestError> {
        let event = LocationEvent::new(TEST_EVENT_VID, now, Position::new(0.0, 0.0));
        self.accept(event, now, true).await
    }
}
