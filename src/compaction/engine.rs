//! Single compaction pass over the raw event log
//!
//! One pass:
//! 1. snapshots the pending events, groups them per vid and records the
//!    highest event id seen as the high-water mark,
//! 2. merges every vid's aggregate against that vid's latest stored segment,
//! 3. commits all resulting inserts and extensions as one unordered batch,
//! 4. deletes the raw events with an id up to the high-water mark.
//!
//! Events appended after the snapshot carry larger ids and survive step 4, so
//! the next pass picks them up. A storage failure before the commit completes
//! returns early and leaves the log untouched for the next pass to retry.

use std::sync::Arc;

use futures_util::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compaction::{paginate, CompactionError};
use crate::core::{EventId, LocationHistory};
use crate::storage::{
    BatchOutcome, EventLog, SegmentOp, SegmentSelector, SegmentStore, StorageError,
};

/// What a pass did, for logging and the status endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CompactionReport {
    pub high_water_mark: Option<EventId>,
    pub events_seen: usize,
    pub vids_seen: usize,
    pub vids_created: usize,
    pub vids_extended: usize,
    pub vids_dropped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed_ops: usize,
    pub events_deleted: usize,
}

#[derive(Debug)]
enum MergePlan {
    /// First history for this vid.
    Create(Vec<SegmentOp>),
    /// Arrivals continue after the latest stored segment.
    Append(Vec<SegmentOp>),
    /// Arrivals overlap or precede the latest stored segment.
    Drop { vid: String, starttime: i64, stored_endtime: i64 },
}

pub struct CompactionEngine {
    events: Arc<dyn EventLog>,
    segments: Arc<dyn SegmentStore>,
    max_segment_size: usize,
}

impl CompactionEngine {
    pub fn new(
        events: Arc<dyn EventLog>,
        segments: Arc<dyn SegmentStore>,
        max_segment_size: usize,
    ) -> Self {
        Self { events, segments, max_segment_size: max_segment_size.max(1) }
    }

    pub fn max_segment_size(&self) -> usize {
        self.max_segment_size
    }

    /// Runs one full pass. Callers must not run two passes concurrently.
    pub async fn run(&self) -> Result<CompactionReport, CompactionError> {
        let groups = self.events.list_all().await?;

        let Some(high_water_mark) = groups.values().flatten().map(|stored| stored.id).max() else {
            debug!("No pending events to compact");
            return Ok(CompactionReport::default());
        };

        let mut report = CompactionReport {
            high_water_mark: Some(high_water_mark),
            events_seen: groups.values().map(Vec::len).sum(),
            vids_seen: groups.len(),
            ..CompactionReport::default()
        };

        let aggregates = groups
            .into_iter()
            .filter_map(|(vid, events)| LocationHistory::aggregate(&vid, events));
        let plans = try_join_all(aggregates.map(|aggregate| self.plan_merge(aggregate))).await?;

        let mut ops = Vec::new();
        for plan in plans {
            match plan {
                MergePlan::Create(planned) => {
                    report.vids_created += 1;
                    ops.extend(planned);
                }
                MergePlan::Append(planned) => {
                    report.vids_extended += 1;
                    ops.extend(planned);
                }
                MergePlan::Drop { vid, starttime, stored_endtime } => {
                    report.vids_dropped += 1;
                    warn!(
                        vid = %vid,
                        starttime = starttime,
                        stored_endtime = stored_endtime,
                        "Dropping out-of-order location events"
                    );
                }
            }
        }

        match self.segments.batch_write(ops).await? {
            BatchOutcome::Committed(summary) => {
                report.inserted = summary.inserted;
                report.updated = summary.updated;
            }
            BatchOutcome::PartialFailure { summary, failures } => {
                report.inserted = summary.inserted;
                report.updated = summary.updated;
                report.failed_ops = failures.len();
                for failure in &failures {
                    warn!(
                        vid = %failure.vid,
                        index = failure.index,
                        reason = %failure.reason,
                        "Segment write failed"
                    );
                }
            }
            BatchOutcome::EmptyBatch => {
                debug!("Compaction produced no segment writes");
            }
        }

        report.events_deleted = self.events.delete_up_to(high_water_mark).await?;

        info!(
            high_water_mark = high_water_mark,
            events = report.events_seen,
            vids = report.vids_seen,
            inserted = report.inserted,
            updated = report.updated,
            dropped_vids = report.vids_dropped,
            failed_ops = report.failed_ops,
            deleted = report.events_deleted,
            "Compaction pass finished"
        );
        Ok(report)
    }

    async fn plan_merge(&self, aggregate: LocationHistory) -> Result<MergePlan, StorageError> {
        let max = self.max_segment_size;

        let Some(latest) = self.segments.find_latest_by_vid(&aggregate.vid).await? else {
            let ops = paginate(aggregate, max, 0).into_iter().map(SegmentOp::Insert).collect();
            return Ok(MergePlan::Create(ops));
        };

        if aggregate.starttime < latest.endtime {
            return Ok(MergePlan::Drop {
                vid: aggregate.vid,
                starttime: aggregate.starttime,
                stored_endtime: latest.endtime,
            });
        }

        if latest.count >= max {
            let ops = paginate(aggregate, max, 0).into_iter().map(SegmentOp::Insert).collect();
            return Ok(MergePlan::Append(ops));
        }

        let selector = SegmentSelector::of(&latest);
        let mut pages = paginate(aggregate, max, latest.count).into_iter();

        let mut ops = Vec::new();
        if let Some(head) = pages.next() {
            let mut extended = latest;
            extended.extend_with(head);
            ops.push(SegmentOp::Extend { selector, segment: extended });
        }
        ops.extend(pages.map(SegmentOp::Insert));
        Ok(MergePlan::Append(ops))
    }
}
