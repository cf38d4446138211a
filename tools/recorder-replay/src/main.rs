//! Recorder Replay: pushes dead-lettered records back into the RocksDB
//! document store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use recorder_replay::replay_file;
use recorder_telemetry::{init_telemetry, TelemetryConfig};
use state_processor::adapters::RocksConnector;
use state_processor::{ProcessorConfig, StoreConnector};

/// Recorder Replay: re-inserts records from the recorder error log
#[derive(Parser, Debug)]
#[command(name = "recorder-replay")]
#[command(about = "Replay dead-lettered transactions, traces and receipts into the store")]
struct Args {
    /// TOML configuration file (defaults plus RECORDER_* variables otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Error log to replay (overrides the configured path)
    #[arg(short, long)]
    log: Option<PathBuf>,

    /// Store directory (overrides the configured path)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Database namespace (overrides the configured name)
    #[arg(short, long)]
    database: Option<String>,

    /// Write pending lines here instead of rewriting the log in place
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _telemetry = init_telemetry(TelemetryConfig::for_component("replay"))
        .context("Failed to initialize telemetry")?;

    let mut config = match &args.config {
        Some(path) => ProcessorConfig::load(path),
        None => ProcessorConfig::from_env(),
    }
    .context("Failed to load configuration")?;

    if let Some(store) = args.store {
        config.store.path = store;
    }
    if let Some(database) = args.database {
        config.store.database = database;
    }
    let log_path = args
        .log
        .unwrap_or_else(|| config.persistence.error_log_path.clone());

    info!(
        log = %log_path.display(),
        store = %config.store.path.display(),
        database = %config.store.database,
        "Replaying recorder error log"
    );

    let connector = RocksConnector::new(config.store.rocks_config());
    let mut store = connector.dial().context("Failed to open document store")?;

    let report = replay_file(&mut store, &log_path, args.output.as_deref())?;

    println!(
        "stored={} duplicates={} failed={} unparseable={} pending={}",
        report.stored,
        report.duplicates,
        report.failed,
        report.unparseable,
        report.remaining.len()
    );
    if args.metrics {
        print!("{}", recorder_telemetry::gather_metrics()?);
    }
    Ok(())
}
