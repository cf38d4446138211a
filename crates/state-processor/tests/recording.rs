//! # Recording Integration Tests
//!
//! Exercises the two persistence paths directly: the batched write-behind
//! sink with its degradation ladder, and the synchronous receipt merger.

use state_processor::adapters::{FileErrorLog, MemoryDocumentStore, MemoryErrorLog};
use state_processor::domain::records::{ReceiptRecord, TransactionRecord};
use state_processor::domain::trace::TraceRecord;
use state_processor::persistence::synchronous::MergeOutcome;
use state_processor::test_utils::test_hash;
use state_processor::{
    BatchedSink, DeadLetter, PersistenceSink, ReceiptMerger, RecordKind, StoreError, TxRecords,
};
use std::collections::HashSet;

fn tx_records(n: u64) -> TxRecords {
    let hash = test_hash(n).to_hex();
    TxRecords {
        transaction: TransactionRecord {
            tx_hash: hash.clone(),
            tx_nonce: format!("0x{n:x}"),
            ..TransactionRecord::default()
        },
        trace: TraceRecord {
            tx_hash: hash.clone(),
            tx_trace: format!("step {n}"),
        },
        receipt: ReceiptRecord {
            re_txhash: hash,
            re_status: "0x1".to_string(),
            re_gasused: "21000".to_string(),
            ..ReceiptRecord::default()
        },
    }
}

#[test]
fn test_flush_fires_on_fiftieth_stage() {
    let store = MemoryDocumentStore::new();
    let mut sink = BatchedSink::new(store.connector(), MemoryErrorLog::new(), 50);

    for n in 0..49 {
        assert!(sink.stage(tx_records(n)).is_none());
        assert_eq!(sink.cursor(), n as usize + 1);
    }
    assert_eq!(store.count(RecordKind::Receipt), 0);

    let report = sink.stage(tx_records(49)).unwrap();
    assert_eq!(sink.cursor(), 0);
    assert_eq!(report.records, 150);
    assert_eq!(report.bulk_inserted, 150);
    for kind in RecordKind::ALL {
        assert_eq!(store.count(kind), 50);
    }
}

#[test]
fn test_batch_of_two_staged_five_times() {
    let store = MemoryDocumentStore::new();
    let mut sink = BatchedSink::new(store.connector(), MemoryErrorLog::new(), 2);

    let flushes: Vec<_> = (0..5).filter_map(|n| sink.stage(tx_records(n))).collect();

    assert_eq!(flushes.len(), 2);
    assert!(flushes.iter().all(|r| r.records == 6));
    assert_eq!(sink.cursor(), 1);
    assert_eq!(store.count(RecordKind::Transaction), 4);

    let rest = sink.flush();
    assert_eq!(rest.records, 3);
    assert_eq!(sink.cursor(), 0);
    assert_eq!(store.count(RecordKind::Transaction), 5);
}

#[test]
fn test_forced_bulk_failure_loses_nothing() {
    let store = MemoryDocumentStore::new();
    let log = MemoryErrorLog::new();
    let mut sink = BatchedSink::new(store.connector(), log.clone(), 50);

    store.fail_bulk_inserts(3, StoreError::Query("bulk write rejected".into()));
    let failing: HashSet<String> = (0..50)
        .filter(|n| n % 7 == 0)
        .map(|n| test_hash(n).to_hex())
        .collect();
    for key in &failing {
        store.fail_key(key.clone());
    }

    let mut report = None;
    for n in 0..50 {
        report = sink.stage(tx_records(n));
    }
    let report = report.unwrap();

    assert!(report.is_accounted());
    assert_eq!(report.bulk_inserted, 0);
    assert_eq!(report.dead_lettered, failing.len() * 3);

    let dead: Vec<DeadLetter> = log
        .lines()
        .iter()
        .map(|line| DeadLetter::parse(line).unwrap())
        .collect();
    assert_eq!(dead.len(), report.dead_lettered);

    for n in 0..50 {
        let key = test_hash(n).to_hex();
        for kind in RecordKind::ALL {
            let stored = store.contains(kind, &key);
            let logged = dead
                .iter()
                .any(|d| d.kind() == kind && d.record.key() == key);
            assert!(stored ^ logged, "{kind} {key} stored={stored} logged={logged}");
        }
    }
}

#[test]
fn test_dead_letters_survive_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("recorder-errors.log");
    let store = MemoryDocumentStore::new();
    store.set_offline(true);

    {
        let log = FileErrorLog::open(&path).unwrap();
        let mut sink = BatchedSink::new(store.connector(), log, 10);
        for n in 0..3 {
            sink.stage(tx_records(n));
        }
        let report = sink.flush();
        assert_eq!(report.dead_lettered, 9);
    }

    let content = std::fs::read_to_string(&path).unwrap();
    let letters: Vec<DeadLetter> = content
        .lines()
        .map(|line| DeadLetter::parse(line).unwrap())
        .collect();
    assert_eq!(letters.len(), 9);
    assert_eq!(letters[0].kind(), RecordKind::Transaction);
    assert_eq!(letters[8].kind(), RecordKind::Receipt);
    assert_eq!(letters[8].record.key(), test_hash(2).to_hex());
}

#[test]
fn test_merge_twice_keeps_external_fail_reason() {
    let store = MemoryDocumentStore::new();
    let merger = ReceiptMerger::new(store.connector());
    let key = test_hash(1).to_hex();

    assert_eq!(merger.merge(tx_records(1)), Ok(MergeOutcome::Inserted));
    assert_eq!(
        store.get(RecordKind::Receipt, &key).unwrap()["re_failreason"],
        ""
    );

    let mut doc = store.get(RecordKind::Receipt, &key).unwrap();
    doc["re_failreason"] = serde_json::json!("out of gas");
    store.put(RecordKind::Receipt, doc).unwrap();

    assert_eq!(merger.merge(tx_records(1)), Ok(MergeOutcome::Merged));
    assert_eq!(merger.merge(tx_records(1)), Ok(MergeOutcome::Merged));

    let doc = store.get(RecordKind::Receipt, &key).unwrap();
    assert_eq!(doc["re_failreason"], "out of gas");
    assert_eq!(doc["re_gasused"], "21000");
    assert_eq!(store.count(RecordKind::Receipt), 1);
    assert_eq!(store.count(RecordKind::Trace), 1);
}

#[test]
fn test_merger_as_sink_reports_errors() {
    let store = MemoryDocumentStore::new();
    let mut sink: Box<dyn PersistenceSink> = Box::new(ReceiptMerger::new(store.connector()));

    assert!(sink.record(tx_records(3)).is_ok());
    store.set_offline(true);
    assert!(sink.record(tx_records(4)).is_err());
    assert!(sink.flush().is_empty());
}
