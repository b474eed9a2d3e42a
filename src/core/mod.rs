//! Core data structures and types for the Waypoint location pipeline

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Monotonically increasing identifier assigned by the raw event log on append.
pub type EventId = u64;

/// Wall clock in milliseconds since epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// Longitude/latitude pair in degrees. Longitude comes first by convention.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lon: f64,
    pub lat: f64,
}

impl Position {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Null island, the point a zeroed decode would produce.
    pub fn is_null_island(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }
}

/// A single accepted location ping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationEvent {
    pub vid: String,
    pub timestamp: i64, // milliseconds since epoch
    pub position: Position,
}

impl LocationEvent {
    pub fn new(vid: &str, timestamp: i64, position: Position) -> Self {
        Self { vid: vid.to_string(), timestamp, position }
    }
}

/// A raw event as held by the event log, tagged with its log identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEvent {
    pub id: EventId,
    pub event: LocationEvent,
}

/// A bounded, chronologically ordered run of samples for one vid.
///
/// `timestamps` and `coordinates` are aligned pairwise and both hold exactly
/// `count` entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationHistory {
    pub vid: String,
    pub count: usize,
    pub starttime: i64,
    pub endtime: i64,
    pub timestamps: Vec<i64>,
    pub coordinates: Vec<Position>,
}

impl LocationHistory {
    /// Builds a segment from already ordered samples.
    ///
    /// Returns `None` for an empty run or when the two sequences disagree in length.
    pub fn from_samples(vid: &str, timestamps: Vec<i64>, coordinates: Vec<Position>) -> Option<Self> {
        if timestamps.is_empty() || timestamps.len() != coordinates.len() {
            return None;
        }
        let starttime = *timestamps.first()?;
        let endtime = *timestamps.last()?;
        Some(Self {
            vid: vid.to_string(),
            count: timestamps.len(),
            starttime,
            endtime,
            timestamps,
            coordinates,
        })
    }

    /// Aggregates a group of raw events for one vid into a single unbounded segment.
    ///
    /// Events are ordered by timestamp; the sort is stable so ties keep log order.
    pub fn aggregate(vid: &str, mut events: Vec<StoredEvent>) -> Option<Self> {
        events.sort_by_key(|stored| stored.event.timestamp);
        let (timestamps, coordinates) =
            events.into_iter().map(|stored| (stored.event.timestamp, stored.event.position)).unzip();
        Self::from_samples(vid, timestamps, coordinates)
    }

    /// Checks the structural invariants a stored segment must hold.
    pub fn is_well_formed(&self) -> bool {
        self.count > 0
            && self.timestamps.len() == self.count
            && self.coordinates.len() == self.count
            && self.timestamps.first() == Some(&self.starttime)
            && self.timestamps.last() == Some(&self.endtime)
            && self.timestamps.windows(2).all(|pair| pair[0] <= pair[1])
    }

    /// Appends another run onto the end of this segment.
    pub fn extend_with(&mut self, tail: LocationHistory) {
        self.count += tail.count;
        self.endtime = tail.endtime;
        self.timestamps.extend(tail.timestamps);
        self.coordinates.extend(tail.coordinates);
    }

    /// Whether this segment overlaps the inclusive time range `[from, to]`.
    pub fn overlaps(&self, from: i64, to: i64) -> bool {
        self.starttime <= to && self.endtime >= from
    }
}

pub mod encoding;
pub use encoding::*;
