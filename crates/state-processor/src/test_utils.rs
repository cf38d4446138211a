//! # Test Utilities
//!
//! Scripted stand-ins for the execution-side ports plus block builders.
//! Clones of the recording doubles share their observations, so a test can
//! keep one copy while the processor owns the other.

use crate::domain::entities::{
    Block, ExecutionOutcome, Header, Message, Receipt, Signature, Transaction, TxContext, VmConfig,
};
use crate::domain::gas_pool::GasPool;
use crate::domain::services::keccak256;
use crate::domain::trace::TraceBuffer;
use crate::domain::value_objects::{Address, Bytes, Hash, U256};
use crate::errors::{ConsensusError, ExecutionError, SignerError};
use crate::ports::outbound::{
    ConsensusEngine, ExecutionEngine, HardForkMutator, MessageSigner, StateHandle,
};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Sender every [`StaticSigner`] recovers.
pub const TEST_SENDER: Address = Address::new([0x5e; 20]);

// =============================================================================
// BUILDERS
// =============================================================================

/// Hash derived from a small integer.
#[must_use]
pub fn test_hash(n: u64) -> Hash {
    keccak256(&n.to_be_bytes())
}

/// A call transaction with a distinct hash and nonce `n`.
#[must_use]
pub fn make_tx(n: u64) -> Transaction {
    Transaction {
        hash: test_hash(n),
        to: Some(Address::new([0x70; 20])),
        nonce: n,
        gas: 100_000,
        gas_price: U256::from(1_000_000_000u64),
        value: U256::from(n),
        input: Bytes::new(),
        signature: Signature {
            v: U256::from(27u64),
            r: U256::from(n + 1),
            s: U256::from(n + 2),
        },
    }
}

/// A contract-creation transaction with nonce `n`.
#[must_use]
pub fn make_creation_tx(n: u64) -> Transaction {
    Transaction {
        to: None,
        input: Bytes::from_slice(&[0x60, 0x80, 0x60, 0x40]),
        ..make_tx(n)
    }
}

/// Header for block `number`.
#[must_use]
pub fn make_header(number: u64) -> Header {
    Header {
        number,
        hash: keccak256(format!("block-{number}").as_bytes()),
        gas_limit: 8_000_000,
        coinbase: Address::new([0xc0; 20]),
        timestamp: 1_500_000_000 + number,
    }
}

/// Block `number` holding `count` call transactions.
#[must_use]
pub fn make_block(number: u64, count: u64) -> Block {
    Block::new(make_header(number), (0..count).map(make_tx).collect())
}

// =============================================================================
// EXECUTION ENGINE
// =============================================================================

/// What the engine saw for one execution.
#[derive(Clone, Debug)]
pub struct ExecutionObservation {
    /// Context handed to the engine.
    pub ctx: TxContext,
    /// Trace buffer contents when execution started.
    pub trace_at_start: String,
    /// Gas left in the pool when execution started.
    pub pool_at_start: u64,
}

#[derive(Debug, Default)]
struct EngineShared {
    script: VecDeque<Result<ExecutionOutcome, ExecutionError>>,
    observations: Vec<ExecutionObservation>,
}

/// Engine returning scripted outcomes in order.
///
/// Debits the message gas limit from the pool and refunds the unused part,
/// like a real engine. Writes one trace line per execution. Once the script
/// runs out every call succeeds using 21000 gas.
#[derive(Clone, Debug, Default)]
pub struct ScriptedEngine {
    shared: Arc<Mutex<EngineShared>>,
}

impl ScriptedEngine {
    /// Creates an engine with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an outcome.
    #[must_use]
    pub fn then(self, outcome: ExecutionOutcome) -> Self {
        self.shared.lock().script.push_back(Ok(outcome));
        self
    }

    /// Queues a successful execution.
    #[must_use]
    pub fn then_succeed(self, gas_used: u64) -> Self {
        self.then(ExecutionOutcome::success(gas_used))
    }

    /// Queues a reverted execution.
    #[must_use]
    pub fn then_revert(self, gas_used: u64, reason: &str) -> Self {
        self.then(ExecutionOutcome::reverted(gas_used, reason))
    }

    /// Queues a fatal engine error.
    #[must_use]
    pub fn then_fail(self, err: ExecutionError) -> Self {
        self.shared.lock().script.push_back(Err(err));
        self
    }

    /// Everything observed so far.
    #[must_use]
    pub fn observations(&self) -> Vec<ExecutionObservation> {
        self.shared.lock().observations.clone()
    }

    /// Number of executions so far.
    #[must_use]
    pub fn executions(&self) -> usize {
        self.shared.lock().observations.len()
    }
}

impl ExecutionEngine for ScriptedEngine {
    fn execute(
        &mut self,
        msg: &Message,
        ctx: &TxContext,
        _state: &mut dyn StateHandle,
        gas_pool: &mut GasPool,
        trace: &mut TraceBuffer,
        _vm_config: &VmConfig,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let mut shared = self.shared.lock();
        shared.observations.push(ExecutionObservation {
            ctx: ctx.clone(),
            trace_at_start: trace.as_str().to_string(),
            pool_at_start: gas_pool.gas(),
        });

        gas_pool.sub_gas(msg.gas)?;
        let outcome = shared
            .script
            .pop_front()
            .unwrap_or_else(|| Ok(ExecutionOutcome::success(21_000)))?;

        trace.push_line(format!(
            "exec {} gas={} failed={}",
            ctx.tx_hash, outcome.gas_used, outcome.failed
        ));
        gas_pool.add_gas(msg.gas.saturating_sub(outcome.gas_used));
        Ok(outcome)
    }
}

// =============================================================================
// STATE
// =============================================================================

/// A call made on [`RecordingState`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateCall {
    /// `prepare(tx_hash, block_hash, tx_index)`.
    Prepare(Hash, Hash, usize),
    /// `finalise(delete_empty_objects)`.
    Finalise(bool),
    /// `intermediate_root(delete_empty_objects)`.
    IntermediateRoot(bool),
}

/// State handle that records every call.
///
/// Intermediate roots are the keccak of a running counter.
#[derive(Debug, Default)]
pub struct RecordingState {
    /// Calls in order.
    pub calls: Vec<StateCall>,
    roots: u64,
}

impl RecordingState {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepared transaction indices, in order.
    #[must_use]
    pub fn prepared_indices(&self) -> Vec<usize> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                StateCall::Prepare(_, _, i) => Some(*i),
                _ => None,
            })
            .collect()
    }
}

impl StateHandle for RecordingState {
    fn prepare(&mut self, tx_hash: Hash, block_hash: Hash, tx_index: usize) {
        self.calls
            .push(StateCall::Prepare(tx_hash, block_hash, tx_index));
    }

    fn finalise(&mut self, delete_empty_objects: bool) {
        self.calls.push(StateCall::Finalise(delete_empty_objects));
    }

    fn intermediate_root(&mut self, delete_empty_objects: bool) -> Hash {
        self.calls
            .push(StateCall::IntermediateRoot(delete_empty_objects));
        self.roots += 1;
        keccak256(&self.roots.to_be_bytes())
    }
}

// =============================================================================
// SIGNER / CONSENSUS / HARD FORK
// =============================================================================

/// Signer recovering [`TEST_SENDER`] for every transaction, except the ones
/// marked as carrying a bad signature.
#[derive(Clone, Debug, Default)]
pub struct StaticSigner {
    bad: HashSet<Hash>,
}

impl StaticSigner {
    /// Creates a signer accepting everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects the transaction with `hash`.
    #[must_use]
    pub fn rejecting(mut self, hash: Hash) -> Self {
        self.bad.insert(hash);
        self
    }
}

impl MessageSigner for StaticSigner {
    fn as_message(&self, tx: &Transaction, _block_number: u64) -> Result<Message, SignerError> {
        if self.bad.contains(&tx.hash) {
            return Err(SignerError::InvalidSignature);
        }
        Ok(Message {
            from: TEST_SENDER,
            to: tx.to,
            nonce: tx.nonce,
            value: tx.value,
            gas: tx.gas,
            gas_price: tx.gas_price,
            data: tx.input.clone(),
        })
    }
}

/// Consensus engine recording the receipts it was asked to finalize.
#[derive(Clone, Debug, Default)]
pub struct RecordingConsensus {
    finalized: Arc<Mutex<Vec<Vec<Receipt>>>>,
    fail_with: Option<String>,
}

impl RecordingConsensus {
    /// Creates a consensus engine that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a consensus engine that always fails with `reason`.
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Receipt lists handed to `finalize`, one entry per call.
    #[must_use]
    pub fn finalized(&self) -> Vec<Vec<Receipt>> {
        self.finalized.lock().clone()
    }
}

impl ConsensusEngine for RecordingConsensus {
    fn finalize(
        &mut self,
        _header: &Header,
        _state: &mut dyn StateHandle,
        _transactions: &[Transaction],
        _uncles: &[Header],
        receipts: &[Receipt],
    ) -> Result<(), ConsensusError> {
        self.finalized.lock().push(receipts.to_vec());
        match &self.fail_with {
            Some(reason) => Err(ConsensusError(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Hard-fork mutator counting its applications.
#[derive(Clone, Debug, Default)]
pub struct CountingHardFork {
    applied: Arc<Mutex<usize>>,
}

impl CountingHardFork {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Times the DAO mutation ran.
    #[must_use]
    pub fn applied(&self) -> usize {
        *self.applied.lock()
    }
}

impl HardForkMutator for CountingHardFork {
    fn apply_dao_hard_fork(&mut self, _state: &mut dyn StateHandle) {
        *self.applied.lock() += 1;
    }
}
