//! HTTP Server Binary for Waypoint
//!
//! Starts the ingestion API together with the periodic compaction loop.
//!
//! Usage:
//!   cargo run --bin http_server -- --host 0.0.0.0 --port 8080 --segment-dir ./data/segments

use anyhow::Context;
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;
use waypoint::{
    compaction::{CompactionEngine, CompactionScheduler},
    config::Config,
    http::{start_server, AppState},
    ingestion::IngestionGate,
    storage::{EventLog, LocalSegmentStore, RingEventLog, SegmentStore},
};

#[derive(Parser, Debug)]
#[command(name = "Waypoint HTTP Server")]
#[command(about = "Location ping ingestion and history compaction service", long_about = None)]
struct Args {
    #[arg(short = 'H', long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Persist history segments under this directory; in-memory when omitted
    #[arg(short, long, env = "SEGMENT_DIR")]
    segment_dir: Option<PathBuf>,

    #[arg(long, env = "MAX_SEGMENT_SIZE", default_value = "100")]
    max_segment_size: usize,

    #[arg(long, env = "CLOCK_THRESHOLD_MS", default_value = "60000")]
    clock_threshold_ms: i64,

    #[arg(long, env = "COMPACTION_INTERVAL_MS", default_value = "300000")]
    compaction_interval_ms: u64,

    #[arg(long, env = "LOG_CAPACITY", default_value = "10000")]
    log_capacity: usize,

    #[arg(long, env = "MAX_MESSAGE_BYTES", default_value = "64")]
    max_message_bytes: usize,
}

impl Args {
    fn config(&self) -> Config {
        Config {
            max_segment_size: self.max_segment_size,
            clock_threshold_ms: self.clock_threshold_ms,
            compaction_interval_ms: self.compaction_interval_ms,
            log_capacity: self.log_capacity,
            segment_dir: self.segment_dir.clone(),
            max_message_bytes: self.max_message_bytes,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received, stopping server");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = args.config();
    config.validate()?;
    info!(config = ?config, "Starting Waypoint");

    let events: Arc<dyn EventLog> = Arc::new(RingEventLog::new(config.log_capacity));
    let segments: Arc<dyn SegmentStore> = match &config.segment_dir {
        Some(dir) => Arc::new(
            LocalSegmentStore::open(dir)
                .with_context(|| format!("opening segment store at {}", dir.display()))?,
        ),
        None => Arc::new(LocalSegmentStore::in_memory()),
    };

    let engine =
        CompactionEngine::new(Arc::clone(&events), Arc::clone(&segments), config.max_segment_size);
    let scheduler = Arc::new(CompactionScheduler::new(engine));
    let compaction =
        tokio::spawn(Arc::clone(&scheduler).run_loop(config.compaction_interval()));

    let state = AppState {
        gate: IngestionGate::new(events, config.clock_threshold_ms, config.max_message_bytes),
        segments,
        scheduler,
    };

    let addr = format!("{}:{}", args.host, args.port);
    let served = start_server(&addr, state, shutdown_signal()).await;

    compaction.abort();
    served.with_context(|| format!("serving on {}", addr))?;
    info!("Server shut down gracefully");
    Ok(())
}
