//! # Block State Processor
//!
//! Executes the transactions of a block in order against a state handle,
//! builds one receipt per transaction and records every transaction's
//! metadata, execution trace and receipt into a document store.
//!
//! ## Architecture
//!
//! ```text
//! Block ──→ StateProcessor ──→ ExecutionEngine (per tx)
//!               │                    │
//!               │              TraceBuffer / GasPool
//!               ↓
//!        ReceiptBuilder ──→ PersistenceSink
//!                              ├── BatchedSink   (write-behind, degrades)
//!                              └── ReceiptMerger (synchronous, idempotent)
//! ```
//!
//! ## Processing Invariants
//!
//! | # | Invariant | Description |
//! |---|-----------|-------------|
//! | 1 | Ordered Receipts | One receipt per transaction, in block order |
//! | 2 | Cumulative Gas | `cumulative_gas_used` is non-decreasing within a block |
//! | 3 | Trace Isolation | A transaction's trace never holds another's steps |
//! | 4 | Abort On Error | The first failing transaction aborts the block |
//! | 5 | Batch Boundary | A batch flushes exactly when it reaches capacity |
//! | 6 | No Lost Records | A flushed record is stored or dead-lettered |
//! | 7 | Fail Reason Kept | Re-recording a receipt keeps its stored fail reason |
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - Pure domain logic (entities, records, staging, receipts)
//! - `ports/` - Port traits (inbound API, outbound SPI)
//! - `persistence/` - Batched and synchronous sinks, dead letters
//! - `adapters/` - Memory, file and RocksDB implementations
//! - `service/` - Application service implementing the API
//! - `config` - TOML / environment configuration
//!
//! ## Usage
//!
//! ```ignore
//! use state_processor::prelude::*;
//!
//! let config = ProcessorConfig::from_env()?;
//! let sink = config.persistence.build_sink(store.connector())?;
//! let deps = ProcessorDependencies { engine, signer, consensus, hard_fork, sink };
//! let mut processor = StateProcessor::new(deps, config.chain);
//!
//! let output = processor.process(&block, &mut state, &VmConfig::default())?;
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod errors;
pub mod persistence;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export key types for convenience
pub use config::{ChainConfig, PersistenceConfig, ProcessorConfig, StoreConfig};
pub use domain::entities::{
    Block, ExecutionOutcome, Header, Log, Message, ProcessOutput, Receipt, ReceiptStatus,
    Transaction, TxContext, VmConfig,
};
pub use domain::gas_pool::GasPool;
pub use domain::records::{Record, RecordKind, TxRecords};
pub use domain::value_objects::{Address, Bloom, Bytes, Hash, U256};
pub use errors::{ProcessError, Result, SinkError, StoreError};
pub use persistence::{
    BatchedSink, DeadLetter, FlushReport, PersistenceMode, PersistenceSink, ReceiptMerger,
};
pub use ports::inbound::BlockProcessorApi;
pub use ports::outbound::{
    ConsensusEngine, DocumentStore, ErrorLog, ExecutionEngine, HardForkMutator, MessageSigner,
    StateHandle, StoreConnector,
};
pub use service::{ProcessorDependencies, StateProcessor};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::ProcessorConfig;
    pub use crate::domain::entities::{Block, ProcessOutput, Receipt, VmConfig};
    pub use crate::errors::ProcessError;
    pub use crate::persistence::{FlushReport, PersistenceMode, PersistenceSink};
    pub use crate::ports::inbound::BlockProcessorApi;
    pub use crate::ports::outbound::{
        ConsensusEngine, ExecutionEngine, HardForkMutator, MessageSigner, StateHandle,
    };
    pub use crate::service::{ProcessorDependencies, StateProcessor};
}
