//! # Block Processing Integration Tests
//!
//! Drives `StateProcessor` end to end through its public API with the
//! scripted engine, a recording state handle and the in-memory store.

use state_processor::adapters::{MemoryDocumentStore, MemoryErrorLog};
use state_processor::errors::ExecutionError;
use state_processor::test_utils::{
    make_block, make_header, make_tx, CountingHardFork, RecordingConsensus, RecordingState,
    ScriptedEngine, StateCall, StaticSigner,
};
use state_processor::{
    Block, BlockProcessorApi, ChainConfig, PersistenceConfig, PersistenceMode, ProcessError,
    ProcessorConfig, ProcessorDependencies, RecordKind, StateProcessor, VmConfig,
};

type Processor =
    StateProcessor<ScriptedEngine, StaticSigner, RecordingConsensus, CountingHardFork>;

fn build(
    engine: ScriptedEngine,
    consensus: RecordingConsensus,
    config: &ProcessorConfig,
    store: &MemoryDocumentStore,
    log: &MemoryErrorLog,
) -> Processor {
    let deps = ProcessorDependencies {
        engine,
        signer: StaticSigner::new(),
        consensus,
        hard_fork: CountingHardFork::new(),
        sink: config
            .persistence
            .build_sink_with_log(store.connector(), log.clone()),
    };
    StateProcessor::new(deps, config.chain.clone())
}

fn batched_config(batch_size: usize) -> ProcessorConfig {
    ProcessorConfig {
        chain: ChainConfig::all_forks(),
        persistence: PersistenceConfig {
            mode: PersistenceMode::Batched,
            batch_size,
            ..PersistenceConfig::default()
        },
        ..ProcessorConfig::default()
    }
}

/// A successful block yields one receipt per transaction, in order, with
/// non-decreasing cumulative gas.
#[test]
fn test_successful_block_receipts_ordered() {
    let store = MemoryDocumentStore::new();
    let log = MemoryErrorLog::new();
    let mut engine = ScriptedEngine::new();
    for i in 0..12u64 {
        engine = engine.then_succeed(21_000 + i * 1_000);
    }
    let mut processor = build(
        engine,
        RecordingConsensus::new(),
        &batched_config(50),
        &store,
        &log,
    );
    let block = make_block(100, 12);

    let output = processor
        .process(&block, &mut RecordingState::new(), &VmConfig::default())
        .unwrap();

    assert_eq!(output.receipts.len(), block.transactions.len());
    for (tx, receipt) in block.transactions.iter().zip(&output.receipts) {
        assert_eq!(receipt.tx_hash, tx.hash);
    }
    assert!(output
        .receipts
        .windows(2)
        .all(|w| w[0].cumulative_gas_used <= w[1].cumulative_gas_used));
    assert_eq!(
        output.receipts.last().map(|r| r.cumulative_gas_used),
        Some(output.gas_used)
    );
}

/// Two transactions, 21000 gas success then 30000 gas revert.
#[test]
fn test_success_then_revert_block() {
    let store = MemoryDocumentStore::new();
    let log = MemoryErrorLog::new();
    let consensus = RecordingConsensus::new();
    let engine = ScriptedEngine::new()
        .then_succeed(21_000)
        .then_revert(30_000, "execution reverted");
    let mut processor = build(engine, consensus.clone(), &batched_config(50), &store, &log);

    let output = processor
        .process(&make_block(7, 2), &mut RecordingState::new(), &VmConfig::default())
        .unwrap();

    assert_eq!(output.receipts.len(), 2);
    assert!(output.receipts[0].succeeded());
    assert!(!output.receipts[1].succeeded());
    assert_eq!(output.gas_used, 51_000);
    assert_eq!(consensus.finalized(), vec![output.receipts.clone()]);
}

/// Each execution starts from an empty trace buffer.
#[test]
fn test_trace_isolated_per_transaction() {
    let store = MemoryDocumentStore::new();
    let log = MemoryErrorLog::new();
    let engine = ScriptedEngine::new();
    let mut processor = build(
        engine.clone(),
        RecordingConsensus::new(),
        &batched_config(3),
        &store,
        &log,
    );
    let block = make_block(9, 3);

    processor
        .process(&block, &mut RecordingState::new(), &VmConfig::default())
        .unwrap();

    assert!(engine
        .observations()
        .iter()
        .all(|o| o.trace_at_start.is_empty()));
    for (i, tx) in block.transactions.iter().enumerate() {
        let doc = store.get(RecordKind::Trace, &tx.hash.to_hex()).unwrap();
        let trace = doc["tx_trace"].as_str().unwrap();
        assert_eq!(trace.lines().count(), 1);
        for (j, other) in block.transactions.iter().enumerate() {
            assert_eq!(trace.contains(&other.hash.to_hex()), i == j);
        }
    }
}

/// The staged batch is flushed by the stage that fills it, across block
/// boundaries.
#[test]
fn test_batch_flushes_on_fiftieth_stage() {
    let store = MemoryDocumentStore::new();
    let log = MemoryErrorLog::new();
    let mut processor = build(
        ScriptedEngine::new(),
        RecordingConsensus::new(),
        &batched_config(50),
        &store,
        &log,
    );

    processor
        .process(&make_block(1, 49), &mut RecordingState::new(), &VmConfig::default())
        .unwrap();
    assert_eq!(store.count(RecordKind::Receipt), 0);

    let next = Block::new(make_header(2), vec![make_tx(49)]);
    processor
        .process(&next, &mut RecordingState::new(), &VmConfig::default())
        .unwrap();

    for kind in RecordKind::ALL {
        assert_eq!(store.count(kind), 50);
    }
    assert_eq!(store.stats().bulk_inserts, 3);
    assert!(processor.flush().is_empty());
    assert!(log.is_empty());
}

/// The first failing transaction aborts the block before finalization.
#[test]
fn test_abort_on_error() {
    let store = MemoryDocumentStore::new();
    let log = MemoryErrorLog::new();
    let consensus = RecordingConsensus::new();
    let engine = ScriptedEngine::new()
        .then_succeed(21_000)
        .then_succeed(21_000)
        .then_fail(ExecutionError::InsufficientFunds);
    let mut processor = build(
        engine.clone(),
        consensus.clone(),
        &batched_config(50),
        &store,
        &log,
    );
    let block = make_block(11, 5);
    let mut state = RecordingState::new();

    let err = processor
        .process(&block, &mut state, &VmConfig::default())
        .unwrap_err();

    assert_eq!(err.tx_hash(), Some(block.transactions[2].hash));
    assert_eq!(engine.executions(), 3);
    assert_eq!(state.prepared_indices(), vec![0, 1, 2]);
    assert!(consensus.finalized().is_empty());

    // The two applied transactions belong to a rejected block.
    assert!(processor.flush().is_empty());
    assert_eq!(store.count(RecordKind::Receipt), 0);
    assert!(log.is_empty());
}

/// The DAO state change runs exactly once, before the fork block's
/// transactions.
#[test]
fn test_dao_fork_block() {
    let store = MemoryDocumentStore::new();
    let hard_fork = CountingHardFork::new();
    let config = ProcessorConfig::default();
    let deps = ProcessorDependencies {
        engine: ScriptedEngine::new(),
        signer: StaticSigner::new(),
        consensus: RecordingConsensus::new(),
        hard_fork: hard_fork.clone(),
        sink: config
            .persistence
            .build_sink_with_log(store.connector(), MemoryErrorLog::new()),
    };
    let mut processor = StateProcessor::new(deps, config.chain.clone());
    let mut state = RecordingState::new();

    processor
        .process(&make_block(1_920_000, 2), &mut state, &VmConfig::default())
        .unwrap();

    assert_eq!(hard_fork.applied(), 1);
    // Pre-Byzantium: every transaction records an intermediate root.
    let roots = state
        .calls
        .iter()
        .filter(|c| matches!(c, StateCall::IntermediateRoot(_)))
        .count();
    assert_eq!(roots, 2);
}

/// Synchronous recording errors abort the block.
#[test]
fn test_synchronous_errors_are_fatal() {
    let store = MemoryDocumentStore::new();
    let log = MemoryErrorLog::new();
    let config = ProcessorConfig {
        chain: ChainConfig::all_forks(),
        persistence: PersistenceConfig {
            mode: PersistenceMode::Synchronous,
            ..PersistenceConfig::default()
        },
        ..ProcessorConfig::default()
    };
    let block = make_block(12, 3);
    store.fail_key(block.transactions[1].hash.to_hex());
    let mut processor = build(
        ScriptedEngine::new(),
        RecordingConsensus::new(),
        &config,
        &store,
        &log,
    );

    let err = processor
        .process(&block, &mut RecordingState::new(), &VmConfig::default())
        .unwrap_err();

    assert!(matches!(err, ProcessError::Persistence { .. }));
    assert_eq!(err.tx_hash(), Some(block.transactions[1].hash));
    assert!(store.contains(RecordKind::Receipt, &block.transactions[0].hash.to_hex()));
    assert!(log.is_empty());
}

/// Replaying a block in synchronous mode keeps externally written fail
/// reasons.
#[test]
fn test_synchronous_replay_keeps_fail_reason() {
    let store = MemoryDocumentStore::new();
    let log = MemoryErrorLog::new();
    let config = ProcessorConfig {
        chain: ChainConfig::all_forks(),
        persistence: PersistenceConfig {
            mode: PersistenceMode::Synchronous,
            ..PersistenceConfig::default()
        },
        ..ProcessorConfig::default()
    };
    let block = make_block(13, 2);
    let key = block.transactions[0].hash.to_hex();

    let mut first = build(ScriptedEngine::new(), RecordingConsensus::new(), &config, &store, &log);
    first
        .process(&block, &mut RecordingState::new(), &VmConfig::default())
        .unwrap();

    let mut annotated = store.get(RecordKind::Receipt, &key).unwrap();
    annotated["re_failreason"] = serde_json::json!("insufficient balance for transfer");
    store.put(RecordKind::Receipt, annotated).unwrap();

    let mut second = build(ScriptedEngine::new(), RecordingConsensus::new(), &config, &store, &log);
    second
        .process(&block, &mut RecordingState::new(), &VmConfig::default())
        .unwrap();

    let doc = store.get(RecordKind::Receipt, &key).unwrap();
    assert_eq!(doc["re_failreason"], "insufficient balance for transfer");
    assert_eq!(store.count(RecordKind::Receipt), 2);
    assert_eq!(store.count(RecordKind::Transaction), 2);
}
