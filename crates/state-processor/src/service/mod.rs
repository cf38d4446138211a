//! # State Processor Service
//!
//! Drives a block's transactions through the execution engine, builds their
//! receipts and hands every transaction's records to the persistence sink.
//!
//! ## Architecture
//!
//! This service:
//! 1. Implements `BlockProcessorApi` (`process`, `apply_transaction`, `flush`)
//! 2. Owns the chain fork schedule and the per-transaction trace buffer
//! 3. Uses dependency injection for the engine, signer, consensus engine,
//!    hard-fork hook and persistence sink

mod processor;

use crate::config::ChainConfig;
use crate::domain::trace::TraceBuffer;
use crate::persistence::{PersistenceMode, PersistenceSink};
use crate::ports::outbound::{ConsensusEngine, ExecutionEngine, HardForkMutator, MessageSigner};

/// The State Processor.
///
/// One instance per import pipeline. Blocks are processed sequentially; the
/// trace buffer and the sink's staging slot are reused across transactions.
pub struct StateProcessor<E, M, C, H>
where
    E: ExecutionEngine,
    M: MessageSigner,
    C: ConsensusEngine,
    H: HardForkMutator,
{
    /// Runs a message against state.
    pub(crate) engine: E,
    /// Recovers senders and shapes messages.
    pub(crate) signer: M,
    /// Post-block reward / finalization hook.
    pub(crate) consensus: C,
    /// DAO irregular state change.
    pub(crate) hard_fork: H,
    /// Where each transaction's records go.
    pub(crate) sink: Box<dyn PersistenceSink>,
    /// Fork schedule.
    pub(crate) chain: ChainConfig,
    /// Trace accumulator shared with the engine.
    pub(crate) trace: TraceBuffer,
}

/// Dependencies for StateProcessor
pub struct ProcessorDependencies<E, M, C, H> {
    pub engine: E,
    pub signer: M,
    pub consensus: C,
    pub hard_fork: H,
    pub sink: Box<dyn PersistenceSink>,
}

impl<E, M, C, H> StateProcessor<E, M, C, H>
where
    E: ExecutionEngine,
    M: MessageSigner,
    C: ConsensusEngine,
    H: HardForkMutator,
{
    /// Create a new State Processor with the given dependencies.
    pub fn new(deps: ProcessorDependencies<E, M, C, H>, chain: ChainConfig) -> Self {
        tracing::info!(
            mode = %deps.sink.mode(),
            byzantium = ?chain.byzantium_block,
            "State processor ready"
        );
        Self {
            engine: deps.engine,
            signer: deps.signer,
            consensus: deps.consensus,
            hard_fork: deps.hard_fork,
            sink: deps.sink,
            chain,
            trace: TraceBuffer::new(),
        }
    }

    /// Persistence mode of the configured sink.
    #[must_use]
    pub fn persistence_mode(&self) -> PersistenceMode {
        self.sink.mode()
    }

    /// Fork schedule in use.
    #[must_use]
    pub fn chain(&self) -> &ChainConfig {
        &self.chain
    }
}

impl<E, M, C, H> Drop for StateProcessor<E, M, C, H>
where
    E: ExecutionEngine,
    M: MessageSigner,
    C: ConsensusEngine,
    H: HardForkMutator,
{
    fn drop(&mut self) {
        let report = self.sink.flush();
        if !report.is_empty() {
            tracing::info!(
                records = report.records,
                dead_lettered = report.dead_lettered,
                "Drained staged records on shutdown"
            );
        }
    }
}
