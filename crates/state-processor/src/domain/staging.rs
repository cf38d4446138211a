//! # Staging Slot
//!
//! Fixed-capacity write-behind buffer for the batched persistence path.
//!
//! ## Invariants
//!
//! - The cursor (number of staged transactions) is always in `[0, capacity)`
//!   between calls: the stage that would make it equal to `capacity` hands the
//!   full batch back to the caller and leaves the slot empty.
//! - Three strongly-typed parallel vectors hold the records; index `i` of each
//!   belongs to the same transaction.
//! - Only one batch is ever open.

use crate::domain::records::{Record, RecordKind, ReceiptRecord, TransactionRecord, TxRecords};
use crate::domain::trace::TraceRecord;

/// Default number of transactions per flushed batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// A full (or drained) batch ready for flushing, in transaction order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StagedBatch {
    /// Transaction metadata records.
    pub transactions: Vec<TransactionRecord>,
    /// Trace records.
    pub traces: Vec<TraceRecord>,
    /// Receipt records.
    pub receipts: Vec<ReceiptRecord>,
}

impl StagedBatch {
    /// Number of transactions in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// True if the batch holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Records of one kind, tagged, in transaction order.
    #[must_use]
    pub fn records(&self, kind: RecordKind) -> Vec<Record> {
        match kind {
            RecordKind::Transaction => self
                .transactions
                .iter()
                .cloned()
                .map(Record::Transaction)
                .collect(),
            RecordKind::Trace => self.traces.iter().cloned().map(Record::Trace).collect(),
            RecordKind::Receipt => self
                .receipts
                .iter()
                .cloned()
                .map(Record::Receipt)
                .collect(),
        }
    }
}

/// Rotating buffer of pending records.
#[derive(Debug)]
pub struct StagingSlot {
    capacity: usize,
    pending: StagedBatch,
}

impl StagingSlot {
    /// Creates a slot flushing every `capacity` transactions (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            pending: StagedBatch {
                transactions: Vec::with_capacity(capacity),
                traces: Vec::with_capacity(capacity),
                receipts: Vec::with_capacity(capacity),
            },
        }
    }

    /// Batch size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Index the next staged transaction will occupy.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.pending.len()
    }

    /// Read-only view of the open batch.
    #[must_use]
    pub fn pending(&self) -> &StagedBatch {
        &self.pending
    }

    /// Stages one transaction's records.
    ///
    /// Returns the full batch when this stage filled the slot; the cursor is
    /// back at zero afterwards.
    pub fn stage(&mut self, records: TxRecords) -> Option<StagedBatch> {
        let TxRecords {
            transaction,
            trace,
            receipt,
        } = records;
        self.pending.transactions.push(transaction);
        self.pending.traces.push(trace);
        self.pending.receipts.push(receipt);

        if self.pending.len() == self.capacity {
            Some(self.take())
        } else {
            None
        }
    }

    /// Drops every staged transaction from index `len` on.
    pub fn truncate(&mut self, len: usize) {
        self.pending.transactions.truncate(len);
        self.pending.traces.truncate(len);
        self.pending.receipts.truncate(len);
    }

    /// Drains whatever is staged, resetting the cursor to zero.
    pub fn take(&mut self) -> StagedBatch {
        std::mem::replace(
            &mut self.pending,
            StagedBatch {
                transactions: Vec::with_capacity(self.capacity),
                traces: Vec::with_capacity(self.capacity),
                receipts: Vec::with_capacity(self.capacity),
            },
        )
    }
}

impl Default for StagingSlot {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}
