//! Prometheus metrics for block processing and execution recording.
//!
//! All metrics follow the naming convention: `recorder_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., blocks_processed_total)
//! - **Gauge**: Value that can go up or down (e.g., staged_transactions)
//! - **Histogram**: Distribution of values (e.g., block_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

fn duration_buckets() -> Vec<f64> {
    exponential_buckets(0.0005, 2.0, 16).unwrap_or_else(|_| prometheus::DEFAULT_BUCKETS.to_vec())
}

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BLOCK PROCESSING
    // =========================================================================

    /// Blocks fully processed (all transactions applied and finalized)
    pub static ref BLOCKS_PROCESSED: Counter = Counter::new(
        "recorder_processor_blocks_processed_total",
        "Total number of blocks processed successfully"
    ).expect("metric creation failed");

    /// Blocks aborted, by failing stage
    pub static ref BLOCK_FAILURES: CounterVec = CounterVec::new(
        Opts::new("recorder_processor_block_failures_total", "Blocks aborted by an error"),
        &["stage"]  // stage: message/execution/persistence/finalize
    ).expect("metric creation failed");

    /// Block processing duration
    pub static ref BLOCK_PROCESSING_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "recorder_processor_block_duration_seconds",
            "Time spent processing a block"
        ).buckets(duration_buckets())
    ).expect("metric creation failed");

    /// Transactions applied, by receipt status
    pub static ref TRANSACTIONS_APPLIED: CounterVec = CounterVec::new(
        Opts::new("recorder_processor_transactions_applied_total", "Transactions applied"),
        &["status"]  // status: success/failed
    ).expect("metric creation failed");

    // =========================================================================
    // RECORDING
    // =========================================================================

    /// Transactions waiting in the staging slot
    pub static ref STAGED_TRANSACTIONS: Gauge = Gauge::new(
        "recorder_sink_staged_transactions",
        "Transactions staged in the open batch"
    ).expect("metric creation failed");

    /// Batch flushes per collection and outcome
    pub static ref BATCH_FLUSHES: CounterVec = CounterVec::new(
        Opts::new("recorder_sink_batch_flushes_total", "Batch flushes per collection"),
        &["collection", "outcome"]  // outcome: bulk/retried/degraded/unreachable
    ).expect("metric creation failed");

    /// Records written to the error log
    pub static ref RECORDS_DEAD_LETTERED: CounterVec = CounterVec::new(
        Opts::new("recorder_sink_records_dead_lettered_total", "Records appended to the error log"),
        &["kind"]  // kind: Transaction/Trace/Receipt
    ).expect("metric creation failed");

    /// Store dials and session refreshes after the first connection
    pub static ref STORE_RECONNECTS: Counter = Counter::new(
        "recorder_sink_store_reconnects_total",
        "Store dials and session refreshes"
    ).expect("metric creation failed");

    /// Synchronous receipt merges, by outcome
    pub static ref RECEIPT_MERGES: CounterVec = CounterVec::new(
        Opts::new("recorder_sink_receipt_merges_total", "Synchronous receipt writes"),
        &["outcome"]  // outcome: inserted/merged/failed
    ).expect("metric creation failed");

    /// Dead letters replayed from the error log
    pub static ref RECORDS_REPLAYED: CounterVec = CounterVec::new(
        Opts::new("recorder_replay_records_total", "Dead letters replayed"),
        &["outcome"]  // outcome: stored/duplicate/failed/unparseable
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Processing
        Box::new(BLOCKS_PROCESSED.clone()),
        Box::new(BLOCK_FAILURES.clone()),
        Box::new(BLOCK_PROCESSING_DURATION.clone()),
        Box::new(TRANSACTIONS_APPLIED.clone()),
        // Recording
        Box::new(STAGED_TRANSACTIONS.clone()),
        Box::new(BATCH_FLUSHES.clone()),
        Box::new(RECORDS_DEAD_LETTERED.clone()),
        Box::new(STORE_RECONNECTS.clone()),
        Box::new(RECEIPT_MERGES.clone()),
        // Replay
        Box::new(RECORDS_REPLAYED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
