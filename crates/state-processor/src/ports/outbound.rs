//! # Outbound Ports (Driven Ports)
//!
//! Everything the processor consumes but does not implement: the execution
//! engine, sender recovery, the state handle, consensus finalization, the
//! DAO hard-fork mutation, the document store and the error log.
//!
//! All calls are blocking and happen on the processing thread.

use crate::domain::entities::{
    ExecutionOutcome, Header, Message, Receipt, Transaction, TxContext, VmConfig,
};
use crate::domain::gas_pool::GasPool;
use crate::domain::records::{Document, RecordKind};
use crate::domain::trace::TraceBuffer;
use crate::domain::value_objects::Hash;
use crate::errors::{ConsensusError, ExecutionError, SignerError, StoreError};

// =============================================================================
// EXECUTION SIDE
// =============================================================================

/// Mutable world state for one block.
///
/// Production: the node's state database. Testing: `RecordingState`
/// (test_utils).
pub trait StateHandle: Send {
    /// Tells the state which transaction the following mutations belong to.
    fn prepare(&mut self, tx_hash: Hash, block_hash: Hash, tx_index: usize);

    /// Finalises pending changes (Byzantium and later).
    fn finalise(&mut self, delete_empty_objects: bool);

    /// Finalises pending changes and returns the intermediate state root
    /// (before Byzantium).
    fn intermediate_root(&mut self, delete_empty_objects: bool) -> Hash;
}

/// The virtual machine.
pub trait ExecutionEngine: Send {
    /// Executes `msg` against `state`.
    ///
    /// The engine debits `gas_pool` and writes its trace into `trace`. A
    /// consensus-valid failure (revert) is an `Ok` outcome with `failed` set;
    /// `Err` is block-fatal.
    fn execute(
        &mut self,
        msg: &Message,
        ctx: &TxContext,
        state: &mut dyn StateHandle,
        gas_pool: &mut GasPool,
        trace: &mut TraceBuffer,
        vm_config: &VmConfig,
    ) -> Result<ExecutionOutcome, ExecutionError>;
}

/// Sender recovery and message shaping.
pub trait MessageSigner: Send {
    /// Converts `tx` into an execution message under the signing rules
    /// active at `block_number`.
    fn as_message(&self, tx: &Transaction, block_number: u64) -> Result<Message, SignerError>;
}

/// Consensus engine hook run after all transactions succeeded.
pub trait ConsensusEngine: Send {
    /// Applies block rewards and any other consensus-level state changes.
    fn finalize(
        &mut self,
        header: &Header,
        state: &mut dyn StateHandle,
        transactions: &[Transaction],
        uncles: &[Header],
        receipts: &[Receipt],
    ) -> Result<(), ConsensusError>;
}

/// Irregular state change applied at the DAO fork block.
pub trait HardForkMutator: Send {
    /// Moves the DAO balances. Called at most once per block, before any
    /// transaction.
    fn apply_dao_hard_fork(&mut self, state: &mut dyn StateHandle);
}

// =============================================================================
// PERSISTENCE SIDE
// =============================================================================

/// A session on the document store.
///
/// One collection per [`RecordKind`]; documents are keyed by the kind's
/// natural key field.
///
/// Production: `RocksDocumentStore` (feature `rocksdb`).
/// Testing: `MemoryDocumentStore`.
pub trait DocumentStore: Send {
    /// Returns false if the handle for `kind`'s collection went stale and
    /// must be re-dialled.
    fn is_valid(&self, kind: RecordKind) -> bool;

    /// Inserts all documents in one call.
    fn insert_many(&mut self, kind: RecordKind, docs: Vec<Document>) -> Result<(), StoreError>;

    /// Inserts a single document.
    fn insert_one(&mut self, kind: RecordKind, doc: Document) -> Result<(), StoreError>;

    /// Looks a document up by natural key.
    fn find_one(&self, kind: RecordKind, key: &str) -> Result<Option<Document>, StoreError>;

    /// Sets the fields of `doc` on the document with natural key `key`.
    /// Stored fields absent from `doc` are left untouched.
    fn update_one(&mut self, kind: RecordKind, key: &str, doc: Document)
        -> Result<(), StoreError>;

    /// Re-establishes the session after a connectivity failure.
    fn refresh(&mut self) -> Result<(), StoreError>;
}

/// Opens sessions on the document store.
pub trait StoreConnector: Send {
    /// Session type.
    type Store: DocumentStore;

    /// Opens a new session.
    fn dial(&self) -> Result<Self::Store, StoreError>;
}

/// Append-only sink for dead-lettered records.
pub trait ErrorLog: Send {
    /// Appends one line (without trailing newline).
    fn append(&mut self, line: &str) -> std::io::Result<()>;
}
