//! Periodic, single-flight compaction scheduling

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::compaction::{CompactionEngine, CompactionError, CompactionReport};
use crate::core::now_millis;

/// Snapshot of scheduler health served by the status endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct CompactionStatus {
    pub running: bool,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub skipped_ticks: u64,
    pub last_success_ms: Option<u64>,
    pub last_report: Option<CompactionReport>,
}

/// Clears the in-progress flag however the run ends, including cancellation.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct CompactionScheduler {
    engine: CompactionEngine,
    in_progress: Arc<AtomicBool>,
    successful_runs: AtomicU64,
    failed_runs: AtomicU64,
    skipped_ticks: AtomicU64,
    last_success_ms: AtomicU64,
    last_report: Mutex<Option<CompactionReport>>,
}

impl CompactionScheduler {
    pub fn new(engine: CompactionEngine) -> Self {
        Self {
            engine,
            in_progress: Arc::new(AtomicBool::new(false)),
            successful_runs: AtomicU64::new(0),
            failed_runs: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
            last_success_ms: AtomicU64::new(0),
            last_report: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<InFlight> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(Arc::clone(&self.in_progress)))
    }

    /// Runs one pass now, or fails with `AlreadyRunning` if one is in flight.
    pub async fn run_once(&self) -> Result<CompactionReport, CompactionError> {
        let guard = self.try_begin().ok_or(CompactionError::AlreadyRunning)?;
        self.run_guarded(guard).await
    }

    /// Starts a pass in the background. Returns `AlreadyRunning` without
    /// spawning anything if a pass is in flight.
    pub fn trigger(self: &Arc<Self>) -> Result<(), CompactionError> {
        let guard = self.try_begin().ok_or(CompactionError::AlreadyRunning)?;
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let _ = scheduler.run_guarded(guard).await;
        });
        Ok(())
    }

    async fn run_guarded(&self, _guard: InFlight) -> Result<CompactionReport, CompactionError> {
        let result = self.engine.run().await;

        match &result {
            Ok(report) => {
                let now = u64::try_from(now_millis()).unwrap_or_default();
                self.last_success_ms.store(now, Ordering::Release);
                self.successful_runs.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut last) = self.last_report.lock() {
                    *last = Some(report.clone());
                }
            }
            Err(e) => {
                self.failed_runs.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "Compaction pass failed, pending events kept for the next pass");
            }
        }
        result
    }

    /// Runs a pass every `interval` until the task is dropped. A tick that
    /// finds a pass still in flight is skipped.
    pub async fn run_loop(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // the first tick completes immediately; passes start one interval in
        ticker.tick().await;
        info!(interval_ms = interval.as_millis() as u64, "Compaction loop started");

        loop {
            ticker.tick().await;
            if let Err(CompactionError::AlreadyRunning) = self.run_once().await {
                self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
                debug!("Compaction still running, skipping tick");
            }
        }
    }

    pub fn status(&self) -> CompactionStatus {
        let last_success_ms = match self.last_success_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(ms),
        };
        CompactionStatus {
            running: self.is_running(),
            successful_runs: self.successful_runs.load(Ordering::Relaxed),
            failed_runs: self.failed_runs.load(Ordering::Relaxed),
            skipped_ticks: self.skipped_ticks.load(Ordering::Relaxed),
            last_success_ms,
            last_report: self.last_report.lock().ok().and_then(|last| last.clone()),
        }
    }
}
