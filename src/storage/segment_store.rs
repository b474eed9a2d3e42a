//! History segment store
//!
//! Segments are written only through [`SegmentStore::batch_write`], which
//! applies an unordered list of inserts and keyed extensions. A failing item
//! never aborts the rest of the batch; the outcome reports which items failed.
//!
//! A vid's latest segment is the one with the greatest endtime; among equal
//! endtimes the most recently inserted one wins. Lookups and extensions both
//! resolve "latest" through the same rule, and an extension only ever applies
//! to the latest segment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::LocationHistory;
use crate::storage::{StorageError, StorageResult};

const SNAPSHOT_FILE: &str = "segments.bin";

/// Pins the exact stored segment an extension applies to: the vid's latest
/// segment, as it was when the extension was planned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentSelector {
    pub vid: String,
    pub endtime: i64,
    pub count: usize,
}

impl SegmentSelector {
    pub fn of(segment: &LocationHistory) -> Self {
        Self { vid: segment.vid.clone(), endtime: segment.endtime, count: segment.count }
    }

    fn matches(&self, segment: &LocationHistory) -> bool {
        segment.endtime == self.endtime && segment.count == self.count
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SegmentOp {
    Insert(LocationHistory),
    /// Replace count, endtime and samples of the segment matched by `selector`.
    Extend { selector: SegmentSelector, segment: LocationHistory },
}

impl SegmentOp {
    pub fn vid(&self) -> &str {
        match self {
            SegmentOp::Insert(segment) => &segment.vid,
            SegmentOp::Extend { selector, .. } => &selector.vid,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl BatchSummary {
    pub fn applied(&self) -> usize {
        self.inserted + self.updated
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OpFailure {
    /// Position of the failed item in the submitted batch.
    pub index: usize,
    pub vid: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOutcome {
    Committed(BatchSummary),
    PartialFailure { summary: BatchSummary, failures: Vec<OpFailure> },
    /// Nothing was submitted.
    EmptyBatch,
}

#[async_trait]
pub trait SegmentStore: Send + Sync + 'static {
    /// The segment of `vid` with the greatest endtime.
    async fn find_latest_by_vid(&self, vid: &str) -> StorageResult<Option<LocationHistory>>;

    async fn batch_write(&self, ops: Vec<SegmentOp>) -> StorageResult<BatchOutcome>;

    /// Segments of `vid` overlapping `[from, to]`, ordered by starttime.
    async fn history(&self, vid: &str, from: i64, to: i64) -> StorageResult<Vec<LocationHistory>>;
}

/// Segment store held in memory, optionally mirrored to a bincode snapshot on disk.
#[derive(Debug)]
pub struct LocalSegmentStore {
    segments: RwLock<SegmentMap>,
    snapshot_path: Option<PathBuf>,
    /// Serializes writers so each batch builds on the state the previous one left.
    write_lock: tokio::sync::Mutex<()>,
}

type SegmentMap = HashMap<String, Vec<LocationHistory>>;

/// Position of the latest segment: greatest endtime, last inserted among ties.
fn latest_index(owned: &[LocationHistory]) -> Option<usize> {
    owned.iter().enumerate().max_by_key(|(_, s)| s.endtime).map(|(index, _)| index)
}

impl LocalSegmentStore {
    pub fn in_memory() -> Self {
        Self {
            segments: RwLock::new(HashMap::new()),
            snapshot_path: None,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Opens a store persisted under `dir`, loading any snapshot already there.
    pub fn open(dir: impl AsRef<Path>) -> StorageResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let snapshot_path = dir.join(SNAPSHOT_FILE);
        let mut segments = SegmentMap::new();
        if snapshot_path.exists() {
            let bytes = std::fs::read(&snapshot_path)?;
            let stored: Vec<LocationHistory> = bincode::deserialize(&bytes)?;
            for segment in stored {
                segments.entry(segment.vid.clone()).or_default().push(segment);
            }
            tracing::info!(
                path = %snapshot_path.display(),
                vids = segments.len(),
                "Loaded segment snapshot"
            );
        }

        Ok(Self {
            segments: RwLock::new(segments),
            snapshot_path: Some(snapshot_path),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Total number of stored segments across all vids.
    pub fn segment_count(&self) -> StorageResult<usize> {
        let segments = self.segments.read().map_err(|_| StorageError::LockPoisoned("segments"))?;
        Ok(segments.values().map(Vec::len).sum())
    }

    fn apply(segments: &mut SegmentMap, op: SegmentOp) -> Result<bool, String> {
        match op {
            SegmentOp::Insert(segment) => {
                if !segment.is_well_formed() {
                    return Err("malformed segment".to_string());
                }
                segments.entry(segment.vid.clone()).or_default().push(segment);
                Ok(true)
            }
            SegmentOp::Extend { selector, segment } => {
                if !segment.is_well_formed() {
                    return Err("malformed segment".to_string());
                }
                let target = segments
                    .get_mut(&selector.vid)
                    .and_then(|owned| {
                        let index = latest_index(owned)?;
                        owned.get_mut(index)
                    })
                    .filter(|latest| selector.matches(latest))
                    .ok_or_else(|| {
                        format!(
                            "latest segment no longer ends at {} with {} samples",
                            selector.endtime, selector.count
                        )
                    })?;

                target.count = segment.count;
                target.endtime = segment.endtime;
                target.timestamps = segment.timestamps;
                target.coordinates = segment.coordinates;
                Ok(false)
            }
        }
    }

    /// Writes `segments` as the on-disk snapshot. Callers hold `write_lock`.
    async fn persist(&self, segments: &SegmentMap) -> StorageResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let all: Vec<&LocationHistory> = segments.values().flatten().collect();
        let bytes = bincode::serialize(&all)?;

        let tmp = path.with_extension("bin.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl SegmentStore for LocalSegmentStore {
    async fn find_latest_by_vid(&self, vid: &str) -> StorageResult<Option<LocationHistory>> {
        let segments = self.segments.read().map_err(|_| StorageError::LockPoisoned("segments"))?;
        Ok(segments.get(vid).and_then(|owned| owned.get(latest_index(owned)?)).cloned())
    }

    async fn batch_write(&self, ops: Vec<SegmentOp>) -> StorageResult<BatchOutcome> {
        if ops.is_empty() {
            return Ok(BatchOutcome::EmptyBatch);
        }

        let _writer = self.write_lock.lock().await;

        // staged on a copy so a failed snapshot write leaves the store untouched
        let mut staged =
            self.segments.read().map_err(|_| StorageError::LockPoisoned("segments"))?.clone();

        let mut summary = BatchSummary::default();
        let mut failures = Vec::new();
        for (index, op) in ops.into_iter().enumerate() {
            let vid = op.vid().to_string();
            match Self::apply(&mut staged, op) {
                Ok(true) => summary.inserted += 1,
                Ok(false) => summary.updated += 1,
                Err(reason) => failures.push(OpFailure { index, vid, reason }),
            }
        }

        if summary.applied() > 0 {
            self.persist(&staged).await?;
            *self.segments.write().map_err(|_| StorageError::LockPoisoned("segments"))? = staged;
        }

        if failures.is_empty() {
            Ok(BatchOutcome::Committed(summary))
        } else {
            Ok(BatchOutcome::PartialFailure { summary, failures })
        }
    }

    async fn history(&self, vid: &str, from: i64, to: i64) -> StorageResult<Vec<LocationHistory>> {
        let segments = self.segments.read().map_err(|_| StorageError::LockPoisoned("segments"))?;
        let mut found: Vec<LocationHistory> = segments
            .get(vid)
            .map(|owned| owned.iter().filter(|s| s.overlaps(from, to)).cloned().collect())
            .unwrap_or_default();
        found.sort_by_key(|s| s.starttime);
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Position;

    fn segment(vid: &str, timestamps: Vec<i64>) -> LocationHistory {
        let coordinates = vec![Position::new(3.0, 51.0); timestamps.len()];
        LocationHistory::from_samples(vid, timestamps, coordinates).unwrap()
    }

    #[tokio::test]
    async fn test_empty_batch_is_reported_not_failed() {
        let store = LocalSegmentStore::in_memory();
        assert_eq!(store.batch_write(Vec::new()).await.unwrap(), BatchOutcome::EmptyBatch);
    }

    #[tokio::test]
    async fn test_find_latest_picks_greatest_endtime() {
        let store = LocalSegmentStore::in_memory();
        store
            .batch_write(vec![
                SegmentOp::Insert(segment("N-00-001", vec![30, 40])),
                SegmentOp::Insert(segment("N-00-001", vec![10, 20])),
            ])
            .await
            .unwrap();

        let latest = store.find_latest_by_vid("N-00-001").await.unwrap().unwrap();
        assert_eq!(latest.endtime, 40);
        assert!(store.find_latest_by_vid("N-00-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extend_applies_to_selected_segment_only() {
        let store = LocalSegmentStore::in_memory();
        store.batch_write(vec![SegmentOp::Insert(segment("N-00-001", vec![1, 2]))]).await.unwrap();

        let extended = segment("N-00-001", vec![1, 2, 3]);
        let outcome = store
            .batch_write(vec![SegmentOp::Extend {
                selector: SegmentSelector { vid: "N-00-001".to_string(), endtime: 2, count: 2 },
                segment: extended.clone(),
            }])
            .await
            .unwrap();
        assert_eq!(outcome, BatchOutcome::Committed(BatchSummary { inserted: 0, updated: 1 }));

        // a second extension against the stale endtime no longer matches
        let outcome = store
            .batch_write(vec![SegmentOp::Extend {
                selector: SegmentSelector { vid: "N-00-001".to_string(), endtime: 2, count: 2 },
                segment: segment("N-00-001", vec![1, 2, 4]),
            }])
            .await
            .unwrap();
        assert!(matches!(outcome, BatchOutcome::PartialFailure { ref failures, .. } if failures.len() == 1));
        assert_eq!(store.find_latest_by_vid("N-00-001").await.unwrap(), Some(extended));
    }

    #[tokio::test]
    async fn test_equal_endtimes_resolve_to_the_newest_segment() {
        let store = LocalSegmentStore::in_memory();
        let full = segment("N-00-001", vec![90, 95, 100]);
        store.batch_write(vec![SegmentOp::Insert(full.clone())]).await.unwrap();
        store.batch_write(vec![SegmentOp::Insert(segment("N-00-001", vec![100]))]).await.unwrap();

        let latest = store.find_latest_by_vid("N-00-001").await.unwrap().unwrap();
        assert_eq!(latest.count, 1);

        let outcome = store
            .batch_write(vec![SegmentOp::Extend {
                selector: SegmentSelector::of(&latest),
                segment: segment("N-00-001", vec![100, 200]),
            }])
            .await
            .unwrap();
        assert_eq!(outcome, BatchOutcome::Committed(BatchSummary { inserted: 0, updated: 1 }));

        let all = store.history("N-00-001", i64::MIN, i64::MAX).await.unwrap();
        assert_eq!(all[0], full);
        assert_eq!(all[1].timestamps, vec![100, 200]);
    }

    #[tokio::test]
    async fn test_extend_of_a_segment_that_is_no_longer_latest_fails() {
        let store = LocalSegmentStore::in_memory();
        let older = segment("N-00-001", vec![1, 2]);
        store.batch_write(vec![SegmentOp::Insert(older.clone())]).await.unwrap();
        store.batch_write(vec![SegmentOp::Insert(segment("N-00-001", vec![2]))]).await.unwrap();

        let outcome = store
            .batch_write(vec![SegmentOp::Extend {
                selector: SegmentSelector::of(&older),
                segment: segment("N-00-001", vec![1, 2, 3]),
            }])
            .await
            .unwrap();
        assert!(matches!(outcome, BatchOutcome::PartialFailure { ref failures, .. } if failures.len() == 1));
        assert_eq!(store.history("N-00-001", i64::MIN, i64::MAX).await.unwrap()[0], older);
    }

    #[tokio::test]
    async fn test_failed_snapshot_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("segments");
        let store = LocalSegmentStore::open(&root).unwrap();
        store.batch_write(vec![SegmentOp::Insert(segment("N-00-001", vec![1, 2]))]).await.unwrap();

        std::fs::remove_dir_all(&root).unwrap();
        let result = store
            .batch_write(vec![SegmentOp::Insert(segment("N-00-002", vec![5]))])
            .await;
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(store.segment_count().unwrap(), 1);
        assert!(store.find_latest_by_vid("N-00-002").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_item_does_not_abort_batch() {
        let store = LocalSegmentStore::in_memory();
        let mut broken = segment("N-00-002", vec![5, 6]);
        broken.count = 7;

        let outcome = store
            .batch_write(vec![
                SegmentOp::Insert(broken),
                SegmentOp::Insert(segment("N-00-001", vec![1])),
            ])
            .await
            .unwrap();

        match outcome {
            BatchOutcome::PartialFailure { summary, failures } => {
                assert_eq!(summary.inserted, 1);
                assert_eq!(failures[0].index, 0);
                assert_eq!(failures[0].vid, "N-00-002");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(store.segment_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_history_filters_and_orders() {
        let store = LocalSegmentStore::in_memory();
        store
            .batch_write(vec![
                SegmentOp::Insert(segment("N-00-001", vec![300, 400])),
                SegmentOp::Insert(segment("N-00-001", vec![100, 200])),
                SegmentOp::Insert(segment("N-00-001", vec![500, 600])),
            ])
            .await
            .unwrap();

        let found = store.history("N-00-001", 150, 450).await.unwrap();
        let starts: Vec<i64> = found.iter().map(|s| s.starttime).collect();
        assert_eq!(starts, vec![100, 300]);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalSegmentStore::open(dir.path()).unwrap();
            store
                .batch_write(vec![SegmentOp::Insert(segment("N-00-001", vec![1, 2, 3]))])
                .await
                .unwrap();
        }

        let reopened = LocalSegmentStore::open(dir.path()).unwrap();
        let latest = reopened.find_latest_by_vid("N-00-001").await.unwrap().unwrap();
        assert_eq!(latest.timestamps, vec![1, 2, 3]);
    }
}
