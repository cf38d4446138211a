//! # Batched Sink
//!
//! Write-behind recording through a [`StagingSlot`].
//!
//! ## Flush policy
//!
//! For each kind, in order transaction → trace → receipt:
//!
//! 1. Acquire a handle. A missing handle, or one whose collection went stale,
//!    is replaced by a fresh dial.
//! 2. Bulk insert all documents of the kind.
//! 3. On a connectivity error, reconnect once and retry the bulk insert once.
//! 4. If the bulk insert still fails, insert the documents one by one.
//! 5. Anything that still fails is dead-lettered to the error log.
//!
//! If no handle can be obtained at all, the whole kind is dead-lettered with
//! the connection error. Nothing here fails the caller.

use crate::domain::records::{Document, Record, RecordKind, TxRecords};
use crate::domain::staging::{StagedBatch, StagingSlot};
use crate::errors::{SinkError, StoreError};
use crate::persistence::dead_letter::DeadLetter;
use crate::persistence::{FlushReport, PersistenceMode, PersistenceSink};
use crate::ports::outbound::{DocumentStore, ErrorLog, StoreConnector};
use recorder_telemetry::{
    metric_inc, BATCH_FLUSHES, RECORDS_DEAD_LETTERED, STAGED_TRANSACTIONS, STORE_RECONNECTS,
};
use tracing::{debug, error, info, warn};

/// How a kind's documents reached their destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlushOutcome {
    Bulk,
    Retried,
    Degraded,
    Unreachable,
}

impl FlushOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::Bulk => "bulk",
            Self::Retried => "retried",
            Self::Degraded => "degraded",
            Self::Unreachable => "unreachable",
        }
    }
}

/// Batched persistence sink.
pub struct BatchedSink<C: StoreConnector, L: ErrorLog> {
    connector: C,
    handle: Option<C::Store>,
    slot: StagingSlot,
    block_start: usize,
    error_log: L,
    last_report: FlushReport,
}

impl<C: StoreConnector, L: ErrorLog> BatchedSink<C, L> {
    /// Creates a sink flushing every `batch_size` transactions.
    ///
    /// No connection is made until the first flush.
    pub fn new(connector: C, error_log: L, batch_size: usize) -> Self {
        Self {
            connector,
            handle: None,
            slot: StagingSlot::new(batch_size),
            block_start: 0,
            error_log,
            last_report: FlushReport::default(),
        }
    }

    /// Number of transactions staged in the open batch.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.slot.cursor()
    }

    /// Configured batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.slot.capacity()
    }

    /// Report of the most recent non-empty flush.
    #[must_use]
    pub fn last_report(&self) -> FlushReport {
        self.last_report
    }

    /// Stages one transaction; flushes if that filled the batch.
    ///
    /// Returns the flush report when a flush happened.
    pub fn stage(&mut self, records: TxRecords) -> Option<FlushReport> {
        let full = self.slot.stage(records);
        STAGED_TRANSACTIONS.set(self.slot.cursor() as f64);
        full.map(|batch| self.flush_batch(batch))
    }

    fn flush_batch(&mut self, batch: StagedBatch) -> FlushReport {
        // The open block's earlier records are in this batch.
        self.block_start = 0;
        let mut report = FlushReport::default();
        for kind in RecordKind::ALL {
            let records = batch.records(kind);
            if !records.is_empty() {
                report.merge(self.flush_kind(kind, records));
            }
        }

        info!(
            transactions = batch.len(),
            bulk = report.bulk_inserted,
            individually = report.individually_inserted,
            dead_lettered = report.dead_lettered,
            "Flushed recorder batch"
        );
        STAGED_TRANSACTIONS.set(self.slot.cursor() as f64);
        self.last_report = report;
        report
    }

    fn flush_kind(&mut self, kind: RecordKind, records: Vec<Record>) -> FlushReport {
        let mut report = FlushReport {
            records: records.len(),
            ..FlushReport::default()
        };
        let mut failed = Vec::new();
        let mut pending = Vec::with_capacity(records.len());

        for record in records {
            match record.to_document() {
                Ok(doc) => pending.push((record, doc)),
                Err(e) => failed.push(DeadLetter::new(record, e)),
            }
        }

        let outcome = self.write_documents(kind, pending, &mut report, &mut failed);
        metric_inc!(BATCH_FLUSHES, &[kind.collection(), outcome.label()]);

        for letter in failed {
            self.dead_letter(&letter);
            report.dead_lettered += 1;
        }
        report
    }

    fn write_documents(
        &mut self,
        kind: RecordKind,
        pending: Vec<(Record, Document)>,
        report: &mut FlushReport,
        failed: &mut Vec<DeadLetter>,
    ) -> FlushOutcome {
        let docs: Vec<Document> = pending.iter().map(|(_, doc)| doc.clone()).collect();
        let count = docs.len();

        let bulk_err = match self.acquire(kind) {
            Ok(store) => match store.insert_many(kind, docs.clone()) {
                Ok(()) => {
                    report.bulk_inserted += count;
                    return FlushOutcome::Bulk;
                }
                Err(e) => e,
            },
            Err(e) => {
                error!(collection = kind.collection(), error = %e, "No store handle, dead-lettering batch");
                failed.extend(pending.into_iter().map(|(r, _)| DeadLetter::new(r, &e)));
                return FlushOutcome::Unreachable;
            }
        };

        warn!(
            collection = kind.collection(),
            records = count,
            error = %bulk_err,
            "Bulk insert failed"
        );

        if bulk_err.is_connectivity() {
            match self.reconnect(kind) {
                Ok(store) => match store.insert_many(kind, docs) {
                    Ok(()) => {
                        report.bulk_inserted += count;
                        return FlushOutcome::Retried;
                    }
                    Err(e) => {
                        warn!(collection = kind.collection(), error = %e, "Bulk retry failed");
                    }
                },
                Err(e) => {
                    error!(collection = kind.collection(), error = %e, "Reconnect failed, dead-lettering batch");
                    failed.extend(pending.into_iter().map(|(r, _)| DeadLetter::new(r, &e)));
                    return FlushOutcome::Unreachable;
                }
            }
        }

        let Some(store) = self.handle.as_mut() else {
            failed.extend(pending.into_iter().map(|(r, _)| DeadLetter::new(r, &bulk_err)));
            return FlushOutcome::Unreachable;
        };

        for (record, doc) in pending {
            match store.insert_one(kind, doc) {
                Ok(()) => report.individually_inserted += 1,
                Err(e) => {
                    debug!(collection = kind.collection(), tx_hash = record.key(), error = %e, "Record insert failed");
                    failed.push(DeadLetter::new(record, e));
                }
            }
        }
        FlushOutcome::Degraded
    }

    /// Returns a usable handle for `kind`, dialling if there is none or the
    /// current one went stale.
    fn acquire(&mut self, kind: RecordKind) -> Result<&mut C::Store, StoreError> {
        let usable = self.handle.as_ref().is_some_and(|h| h.is_valid(kind));
        if !usable {
            if self.handle.is_some() {
                debug!(collection = kind.collection(), "Store handle stale, redialling");
            }
            self.handle = None;
            let store = self.connector.dial()?;
            metric_inc!(STORE_RECONNECTS);
            self.handle = Some(store);
        }
        self.handle
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("no store handle".to_string()))
    }

    /// Refreshes the session, falling back to a fresh dial.
    fn reconnect(&mut self, kind: RecordKind) -> Result<&mut C::Store, StoreError> {
        let refreshed = match self.handle.as_mut() {
            Some(store) => store.refresh().is_ok() && store.is_valid(kind),
            None => false,
        };
        metric_inc!(STORE_RECONNECTS);
        if !refreshed {
            self.handle = None;
            self.handle = Some(self.connector.dial()?);
        }
        self.handle
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("no store handle".to_string()))
    }

    fn dead_letter(&mut self, letter: &DeadLetter) {
        let kind = letter.kind();
        metric_inc!(RECORDS_DEAD_LETTERED, &[kind.label()]);
        if let Err(e) = self.error_log.append(&letter.to_line()) {
            error!(
                kind = kind.label(),
                tx_hash = letter.record.key(),
                error = %e,
                "Failed to append to error log"
            );
        }
    }
}

impl<C, L> PersistenceSink for BatchedSink<C, L>
where
    C: StoreConnector,
    L: ErrorLog,
{
    fn mode(&self) -> PersistenceMode {
        PersistenceMode::Batched
    }

    fn record(&mut self, records: TxRecords) -> Result<(), SinkError> {
        self.stage(records);
        Ok(())
    }

    fn flush(&mut self) -> FlushReport {
        let batch = self.slot.take();
        if batch.is_empty() {
            return FlushReport::default();
        }
        self.flush_batch(batch)
    }

    fn begin_block(&mut self) {
        self.block_start = self.slot.cursor();
    }

    fn discard_block(&mut self) -> usize {
        let dropped = self.slot.cursor().saturating_sub(self.block_start);
        self.slot.truncate(self.block_start);
        STAGED_TRANSACTIONS.set(self.slot.cursor() as f64);
        if dropped > 0 {
            warn!(dropped, "Discarded staged records of failed block");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryDocumentStore, MemoryErrorLog};
    use crate::domain::records::{ReceiptRecord, TransactionRecord};
    use crate::domain::trace::TraceRecord;

    fn records(n: usize) -> TxRecords {
        let key = format!("0x{n:064x}");
        TxRecords {
            transaction: TransactionRecord {
                tx_hash: key.clone(),
                tx_gas: "21000".into(),
                ..TransactionRecord::default()
            },
            trace: TraceRecord {
                tx_hash: key.clone(),
                tx_trace: format!("trace {n}"),
            },
            receipt: ReceiptRecord {
                re_txhash: key,
                re_status: "0x1".into(),
                ..ReceiptRecord::default()
            },
        }
    }

    fn sink(
        store: &MemoryDocumentStore,
        log: &MemoryErrorLog,
        batch_size: usize,
    ) -> BatchedSink<crate::adapters::MemoryConnector, MemoryErrorLog> {
        BatchedSink::new(store.connector(), log.clone(), batch_size)
    }

    #[test]
    fn test_flush_happens_on_full_batch_only() {
        let store = MemoryDocumentStore::new();
        let log = MemoryErrorLog::new();
        let mut sink = sink(&store, &log, 3);

        assert!(sink.stage(records(0)).is_none());
        assert!(sink.stage(records(1)).is_none());
        assert_eq!(store.count(RecordKind::Transaction), 0);

        let report = sink.stage(records(2)).unwrap();
        assert_eq!(report.records, 9);
        assert_eq!(report.bulk_inserted, 9);
        assert_eq!(sink.cursor(), 0);
        for kind in RecordKind::ALL {
            assert_eq!(store.count(kind), 3);
        }
        assert!(log.is_empty());
        assert_eq!(store.stats().bulk_inserts, 3);
    }

    #[test]
    fn test_discard_block_keeps_earlier_blocks() {
        let store = MemoryDocumentStore::new();
        let log = MemoryErrorLog::new();
        let mut sink = sink(&store, &log, 10);

        sink.begin_block();
        sink.stage(records(0));
        sink.begin_block();
        sink.stage(records(1));
        sink.stage(records(2));

        assert_eq!(sink.discard_block(), 2);
        assert_eq!(sink.cursor(), 1);

        let report = sink.flush();
        assert_eq!(report.bulk_inserted, 3);
        assert!(store.get(RecordKind::Receipt, &records(0).receipt.re_txhash).is_some());
        assert!(store.get(RecordKind::Receipt, &records(1).receipt.re_txhash).is_none());
    }

    #[test]
    fn test_discard_after_mid_block_flush_drops_only_unwritten() {
        let store = MemoryDocumentStore::new();
        let log = MemoryErrorLog::new();
        let mut sink = sink(&store, &log, 2);

        sink.begin_block();
        sink.stage(records(0));
        assert!(sink.stage(records(1)).is_some());
        sink.stage(records(2));

        assert_eq!(sink.discard_block(), 1);
        assert_eq!(sink.cursor(), 0);
        assert!(sink.flush().is_empty());
        assert_eq!(store.count(RecordKind::Receipt), 2);
    }

    #[test]
    fn test_query_failure_degrades_to_single_inserts() {
        let store = MemoryDocumentStore::new();
        let log = MemoryErrorLog::new();
        let mut sink = sink(&store, &log, 2);
        store.fail_bulk_inserts(1, StoreError::Query("write conflict".into()));

        sink.stage(records(0));
        let report = sink.stage(records(1)).unwrap();

        // Only the transaction bulk failed; the others went in bulk.
        assert_eq!(report.individually_inserted, 2);
        assert_eq!(report.bulk_inserted, 4);
        assert!(report.is_accounted());
        assert_eq!(store.stats().refreshes, 0);
        assert_eq!(store.count(RecordKind::Transaction), 2);
    }

    #[test]
    fn test_connectivity_failure_retries_bulk_once() {
        let store = MemoryDocumentStore::new();
        let log = MemoryErrorLog::new();
        let mut sink = sink(&store, &log, 1);
        store.fail_bulk_inserts(1, StoreError::Unavailable("socket closed".into()));

        let report = sink.stage(records(0)).unwrap();

        assert_eq!(report.bulk_inserted, 3);
        assert_eq!(report.individually_inserted, 0);
        assert_eq!(store.stats().refreshes, 1);
        assert_eq!(store.stats().bulk_inserts, 4);
    }

    #[test]
    fn test_failing_records_are_dead_lettered() {
        let store = MemoryDocumentStore::new();
        let log = MemoryErrorLog::new();
        let mut sink = sink(&store, &log, 2);
        let bad = records(1);
        store.fail_key(bad.tx_hash());

        sink.stage(records(0));
        let report = sink.stage(bad.clone()).unwrap();

        assert_eq!(report.dead_lettered, 3);
        assert_eq!(report.individually_inserted, 3);
        assert!(report.is_accounted());

        let lines = log.lines();
        assert_eq!(lines.len(), 3);
        let kinds: Vec<_> = lines
            .iter()
            .map(|l| DeadLetter::parse(l).unwrap().kind())
            .collect();
        assert_eq!(kinds, RecordKind::ALL.to_vec());
        assert!(lines.iter().all(|l| l.contains(bad.tx_hash())));
    }

    #[test]
    fn test_unreachable_store_dead_letters_everything() {
        let store = MemoryDocumentStore::new();
        let log = MemoryErrorLog::new();
        let mut sink = sink(&store, &log, 2);
        store.set_offline(true);

        sink.stage(records(0));
        let report = sink.stage(records(1)).unwrap();

        assert_eq!(report.dead_lettered, 6);
        assert_eq!(report.stored(), 0);
        assert!(log.lines().iter().all(|l| l.ends_with("dial failed: connection refused")));
    }

    #[test]
    fn test_error_log_failure_is_swallowed() {
        let store = MemoryDocumentStore::new();
        let log = MemoryErrorLog::new();
        let mut sink = sink(&store, &log, 1);
        store.set_offline(true);
        log.set_failing(true);

        let report = sink.stage(records(0)).unwrap();
        assert_eq!(report.dead_lettered, 3);
        assert!(log.is_empty());
        assert_eq!(sink.cursor(), 0);
    }

    #[test]
    fn test_stale_handle_is_redialled() {
        let store = MemoryDocumentStore::new();
        let log = MemoryErrorLog::new();
        let mut sink = sink(&store, &log, 1);

        sink.stage(records(0));
        assert_eq!(store.stats().dials, 1);

        store.mark_stale(RecordKind::Trace);
        let report = sink.stage(records(1)).unwrap();
        assert_eq!(report.bulk_inserted, 3);
        assert_eq!(store.stats().dials, 2);
    }

    #[test]
    fn test_explicit_flush_drains_partial_batch() {
        let store = MemoryDocumentStore::new();
        let log = MemoryErrorLog::new();
        let mut sink = sink(&store, &log, 50);

        sink.record(records(0)).unwrap();
        sink.record(records(1)).unwrap();
        assert_eq!(sink.cursor(), 2);

        let report = sink.flush();
        assert_eq!(report.bulk_inserted, 6);
        assert_eq!(sink.cursor(), 0);
        assert_eq!(sink.last_report(), report);
        assert!(sink.flush().is_empty());
    }
}
