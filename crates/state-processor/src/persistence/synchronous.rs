//! # Receipt Merger
//!
//! Synchronous, idempotent recording. Each call dials its own session:
//!
//! - transaction and trace documents are inserted only if absent;
//! - a receipt is inserted with an empty failure reason if absent, otherwise
//!   its execution fields are replaced while the stored `re_failreason` is
//!   carried over.
//!
//! Re-applying the same block therefore never duplicates a record and never
//! loses a failure annotation written by another process.

use crate::domain::records::{Record, RecordKind, ReceiptRecord, TxRecords};
use crate::errors::{SinkError, StoreError};
use crate::persistence::{FlushReport, PersistenceMode, PersistenceSink};
use crate::ports::outbound::{DocumentStore, StoreConnector};
use recorder_telemetry::{metric_inc, RECEIPT_MERGES, STORE_RECONNECTS};
use tracing::{debug, warn};

/// What happened to a receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No receipt was stored; a new one was inserted.
    Inserted,
    /// A stored receipt was updated in place.
    Merged,
}

/// Synchronous persistence sink.
pub struct ReceiptMerger<C: StoreConnector> {
    connector: C,
}

impl<C: StoreConnector> ReceiptMerger<C> {
    /// Creates a merger dialling through `connector`.
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Records one transaction's documents.
    pub fn merge(&self, records: TxRecords) -> Result<MergeOutcome, SinkError> {
        let TxRecords {
            transaction,
            trace,
            receipt,
        } = records;

        let mut store = self.dial()?;
        insert_if_absent(&mut store, &Record::Transaction(transaction))?;
        insert_if_absent(&mut store, &Record::Trace(trace))?;
        let outcome = merge_receipt(&mut store, receipt);

        let label = match &outcome {
            Ok(MergeOutcome::Inserted) => "inserted",
            Ok(MergeOutcome::Merged) => "merged",
            Err(_) => "failed",
        };
        metric_inc!(RECEIPT_MERGES, &[label]);
        outcome
    }

    /// Dials a session, retrying once on a connectivity error.
    fn dial(&self) -> Result<C::Store, StoreError> {
        self.connector.dial().or_else(|e| {
            if !e.is_connectivity() {
                return Err(e);
            }
            warn!(error = %e, "Store dial failed, retrying once");
            metric_inc!(STORE_RECONNECTS);
            self.connector.dial()
        })
    }
}

fn insert_if_absent<S: DocumentStore>(store: &mut S, record: &Record) -> Result<(), SinkError> {
    let kind = record.kind();
    if store.find_one(kind, record.key())?.is_some() {
        debug!(collection = kind.collection(), tx_hash = record.key(), "Already recorded");
        return Ok(());
    }
    let doc = record
        .to_document()
        .map_err(|e| SinkError::Serialization(e.to_string()))?;
    store.insert_one(kind, doc)?;
    Ok(())
}

fn merge_receipt<S: DocumentStore>(
    store: &mut S,
    mut receipt: ReceiptRecord,
) -> Result<MergeOutcome, SinkError> {
    let kind = RecordKind::Receipt;
    let existing = store.find_one(kind, &receipt.re_txhash)?;

    let outcome = match &existing {
        None => {
            receipt.re_failreason = String::new();
            MergeOutcome::Inserted
        }
        Some(stored) => {
            receipt.re_failreason = stored
                .get("re_failreason")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            MergeOutcome::Merged
        }
    };

    let key = receipt.re_txhash.clone();
    let doc = Record::Receipt(receipt)
        .to_document()
        .map_err(|e| SinkError::Serialization(e.to_string()))?;

    match outcome {
        MergeOutcome::Inserted => store.insert_one(kind, doc)?,
        MergeOutcome::Merged => store.update_one(kind, &key, doc)?,
    }
    debug!(tx_hash = %key, ?outcome, "Receipt recorded");
    Ok(outcome)
}

impl<C: StoreConnector> PersistenceSink for ReceiptMerger<C> {
    fn mode(&self) -> PersistenceMode {
        PersistenceMode::Synchronous
    }

    fn record(&mut self, records: TxRecords) -> Result<(), SinkError> {
        self.merge(records).map(|_| ())
    }

    fn flush(&mut self) -> FlushReport {
        FlushReport::default()
    }
}
