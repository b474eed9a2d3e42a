//! Bounded raw event log
//!
//! Pending pings wait here until the compaction engine folds them into
//! history segments. The log assigns every appended event a fresh, strictly
//! increasing [`EventId`], drops duplicates of an already pending
//! `(vid, timestamp)` pair, and evicts its oldest entry once full.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::{EventId, LocationEvent, StoredEvent};
use crate::storage::{StorageError, StorageResult};

#[async_trait]
pub trait EventLog: Send + Sync + 'static {
    /// Appends an event and returns its new id, or `None` when an event with
    /// the same vid and timestamp is already pending.
    async fn append(&self, event: LocationEvent) -> StorageResult<Option<EventId>>;

    /// Every pending event grouped by vid, each group in insertion order.
    async fn list_all(&self) -> StorageResult<BTreeMap<String, Vec<StoredEvent>>>;

    /// Deletes every event whose id is `<= mark`, returning how many were removed.
    async fn delete_up_to(&self, mark: EventId) -> StorageResult<usize>;

    async fn len(&self) -> StorageResult<usize>;
}

#[derive(Debug)]
struct RingState {
    events: VecDeque<StoredEvent>,
    keys: HashSet<(String, i64)>,
    next_id: EventId,
    evicted: u64,
}

/// In-memory ring buffer implementation of [`EventLog`].
#[derive(Debug)]
pub struct RingEventLog {
    state: Mutex<RingState>,
    capacity: usize,
}

impl RingEventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RingState {
                events: VecDeque::with_capacity(capacity),
                keys: HashSet::with_capacity(capacity),
                next_id: 1,
                evicted: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events dropped because the log was full.
    pub fn evicted(&self) -> StorageResult<u64> {
        Ok(self.lock()?.evicted)
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, RingState>> {
        self.state.lock().map_err(|_| StorageError::LockPoisoned("event log"))
    }
}

#[async_trait]
impl EventLog for RingEventLog {
    async fn append(&self, event: LocationEvent) -> StorageResult<Option<EventId>> {
        let mut state = self.lock()?;

        let key = (event.vid.clone(), event.timestamp);
        if state.keys.contains(&key) {
            return Ok(None);
        }

        if state.events.len() >= self.capacity {
            if let Some(oldest) = state.events.pop_front() {
                state.keys.remove(&(oldest.event.vid, oldest.event.timestamp));
                state.evicted += 1;
                tracing::debug!(id = oldest.id, "Event log full, evicted oldest event");
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        state.keys.insert(key);
        state.events.push_back(StoredEvent { id, event });
        Ok(Some(id))
    }

    async fn list_all(&self) -> StorageResult<BTreeMap<String, Vec<StoredEvent>>> {
        let state = self.lock()?;

        let mut groups: BTreeMap<String, Vec<StoredEvent>> = BTreeMap::new();
        for stored in &state.events {
            groups.entry(stored.event.vid.clone()).or_default().push(stored.clone());
        }
        Ok(groups)
    }

    async fn delete_up_to(&self, mark: EventId) -> StorageResult<usize> {
        let mut state = self.lock()?;

        // ids are handed out in insertion order, so the deque is sorted by id
        let mut removed = 0;
        while state.events.front().is_some_and(|front| front.id <= mark) {
            if let Some(stored) = state.events.pop_front() {
                state.keys.remove(&(stored.event.vid, stored.event.timestamp));
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn len(&self) -> StorageResult<usize> {
        Ok(self.lock()?.events.len())
    }
}
