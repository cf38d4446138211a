//! # Recorder Replay
//!
//! Reads the recorder's error log back and re-inserts every dead-lettered
//! record into a document store. Lines that still fail are kept so the next
//! run can pick them up.
//!
//! A record whose key is already stored counts as replayed: the store copy
//! wins.

use anyhow::{Context, Result};
use recorder_telemetry::{metric_inc, RECORDS_REPLAYED};
use state_processor::errors::StoreError;
use state_processor::{DeadLetter, DocumentStore};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Outcome of one replay pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Records inserted.
    pub stored: usize,
    /// Records already present in the store.
    pub duplicates: usize,
    /// Records the store rejected again.
    pub failed: usize,
    /// Lines that are not dead letters.
    pub unparseable: usize,
    /// Lines to keep: failed records with their new error, then unparseable
    /// lines verbatim.
    pub remaining: Vec<String>,
}

impl ReplayReport {
    /// True if nothing is left to replay.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Replays error-log lines into `store`. Blank lines are skipped.
pub fn replay_lines<'a, S, I>(store: &mut S, lines: I) -> ReplayReport
where
    S: DocumentStore,
    I: IntoIterator<Item = &'a str>,
{
    let mut report = ReplayReport::default();
    let mut unparseable = Vec::new();

    for line in lines.into_iter().filter(|l| !l.trim().is_empty()) {
        let letter = match DeadLetter::parse(line) {
            Ok(letter) => letter,
            Err(e) => {
                warn!(error = %e, "Skipping unparseable error log line");
                metric_inc!(RECORDS_REPLAYED, &["unparseable"]);
                report.unparseable += 1;
                unparseable.push(line.to_string());
                continue;
            }
        };

        match insert(store, &letter) {
            Ok(()) => {
                metric_inc!(RECORDS_REPLAYED, &["stored"]);
                report.stored += 1;
            }
            Err(StoreError::DuplicateKey { .. }) => {
                debug!(kind = %letter.kind(), tx_hash = letter.record.key(), "Already stored");
                metric_inc!(RECORDS_REPLAYED, &["duplicate"]);
                report.duplicates += 1;
            }
            Err(e) => {
                debug!(kind = %letter.kind(), tx_hash = letter.record.key(), error = %e, "Replay failed");
                metric_inc!(RECORDS_REPLAYED, &["failed"]);
                report.failed += 1;
                report
                    .remaining
                    .push(DeadLetter::new(letter.record, e).to_line());
            }
        }
    }

    report.remaining.extend(unparseable);
    report
}

fn insert<S: DocumentStore>(store: &mut S, letter: &DeadLetter) -> Result<(), StoreError> {
    let doc = letter.record.to_document()?;
    store.insert_one(letter.kind(), doc)
}

/// Replays the error log at `log_path`, then writes the lines still pending
/// to `output` (or back over the log itself).
pub fn replay_file<S: DocumentStore>(
    store: &mut S,
    log_path: &Path,
    output: Option<&Path>,
) -> Result<ReplayReport> {
    let content = fs::read_to_string(log_path)
        .with_context(|| format!("Failed to read error log {}", log_path.display()))?;

    let report = replay_lines(store, content.lines());

    let target = output.unwrap_or(log_path);
    write_remaining(target, &report.remaining)?;

    info!(
        stored = report.stored,
        duplicates = report.duplicates,
        failed = report.failed,
        unparseable = report.unparseable,
        remaining = %target.display(),
        "Replay finished"
    );
    Ok(report)
}

/// Writes through a sibling temp file so a crash never truncates the log.
fn write_remaining(path: &Path, lines: &[String]) -> Result<()> {
    let mut body = lines.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    let tmp = path.with_extension("replay.tmp");
    fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
