//! # Persistence Sinks
//!
//! Where the records of an applied transaction go.
//!
//! | Sink | Mode | Failure policy |
//! |------|------|----------------|
//! | [`BatchedSink`] | `batched` | never fails the caller; bulk, then per record, then error log |
//! | [`ReceiptMerger`] | `synchronous` | idempotent per transaction; errors are block-fatal |

pub mod batched;
pub mod dead_letter;
pub mod synchronous;

pub use batched::BatchedSink;
pub use dead_letter::DeadLetter;
pub use synchronous::ReceiptMerger;

use crate::domain::records::TxRecords;
use crate::errors::SinkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which sink the processor records through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// Write-behind batches with graceful degradation.
    #[default]
    Batched,
    /// Read-before-write per transaction.
    Synchronous,
}

impl fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Batched => "batched",
            Self::Synchronous => "synchronous",
        })
    }
}

impl FromStr for PersistenceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batched" | "batch" => Ok(Self::Batched),
            "synchronous" | "sync" => Ok(Self::Synchronous),
            other => Err(format!("unknown persistence mode: {other}")),
        }
    }
}

/// What a flush did with the records it was handed.
///
/// Every record is counted exactly once in `bulk_inserted`,
/// `individually_inserted` or `dead_lettered`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Records (documents, all kinds) in the flushed batch.
    pub records: usize,
    /// Records written by a bulk insert.
    pub bulk_inserted: usize,
    /// Records written one at a time after a bulk failure.
    pub individually_inserted: usize,
    /// Records appended to the error log.
    pub dead_lettered: usize,
}

impl FlushReport {
    /// Adds `other`'s counters to this report.
    pub fn merge(&mut self, other: FlushReport) {
        self.records += other.records;
        self.bulk_inserted += other.bulk_inserted;
        self.individually_inserted += other.individually_inserted;
        self.dead_lettered += other.dead_lettered;
    }

    /// Records that reached the store.
    #[must_use]
    pub fn stored(&self) -> usize {
        self.bulk_inserted + self.individually_inserted
    }

    /// True if every record is either stored or dead-lettered.
    #[must_use]
    pub fn is_accounted(&self) -> bool {
        self.stored() + self.dead_lettered == self.records
    }

    /// True if nothing was flushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// Destination for the records of every applied transaction.
pub trait PersistenceSink: Send {
    /// Mode implemented by this sink.
    fn mode(&self) -> PersistenceMode;

    /// Hands over the records of one transaction.
    ///
    /// Only synchronous sinks return errors.
    fn record(&mut self, records: TxRecords) -> Result<(), SinkError>;

    /// Writes out anything still buffered.
    fn flush(&mut self) -> FlushReport;

    /// Marks the start of a block.
    fn begin_block(&mut self) {}

    /// Drops records of the current block that are still buffered, after the
    /// block failed. Returns how many transactions were dropped.
    ///
    /// Records already written by a flush inside the block stay written.
    fn discard_block(&mut self) -> usize {
        0
    }
}
