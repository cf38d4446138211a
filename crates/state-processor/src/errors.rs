//! # Error Types
//!
//! Two tiers:
//!
//! - [`ProcessError`] is block-fatal. It aborts `process` and is never retried.
//! - [`StoreError`] / [`SinkError`] describe persistence trouble. The batched
//!   sink absorbs them (dead-lettering as a last resort); the synchronous sink
//!   surfaces them as [`ProcessError::Persistence`].

use crate::domain::value_objects::Hash;
use thiserror::Error;

/// Result alias for block processing.
pub type Result<T> = std::result::Result<T, ProcessError>;

// =============================================================================
// BLOCK-FATAL ERRORS
// =============================================================================

/// Errors that abort processing of the whole block.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Sender recovery or message shaping failed.
    #[error("message construction failed for tx {tx_hash}: {source}")]
    MessageConstruction {
        /// Offending transaction.
        tx_hash: Hash,
        /// Underlying signer error.
        #[source]
        source: SignerError,
    },

    /// The execution engine reported a fatal error.
    #[error("execution failed for tx {tx_hash}: {source}")]
    Execution {
        /// Offending transaction.
        tx_hash: Hash,
        /// Underlying engine error.
        #[source]
        source: ExecutionError,
    },

    /// Synchronous persistence failed (fatal only in synchronous mode).
    #[error("persistence failed for tx {tx_hash}: {source}")]
    Persistence {
        /// Transaction whose records could not be written.
        tx_hash: Hash,
        /// Underlying sink error.
        #[source]
        source: SinkError,
    },

    /// Consensus finalization failed.
    #[error("block finalization failed: {0}")]
    Finalize(#[from] ConsensusError),
}

impl ProcessError {
    /// Transaction the error is attributed to, if any.
    #[must_use]
    pub fn tx_hash(&self) -> Option<Hash> {
        match self {
            Self::MessageConstruction { tx_hash, .. }
            | Self::Execution { tx_hash, .. }
            | Self::Persistence { tx_hash, .. } => Some(*tx_hash),
            Self::Finalize(_) => None,
        }
    }
}

/// Gas pool accounting errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GasPoolError {
    /// The block gas pool cannot cover the requested amount.
    #[error("gas limit reached: available {available}, requested {requested}")]
    GasLimitReached {
        /// Gas left in the pool.
        available: u64,
        /// Gas the transaction asked for.
        requested: u64,
    },
}

/// Fatal errors reported by the execution engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// Block gas pool exhausted.
    #[error(transparent)]
    GasPool(#[from] GasPoolError),

    /// Sender nonce does not match the account nonce.
    #[error("nonce mismatch: expected {expected}, got {actual}")]
    NonceMismatch {
        /// Account nonce.
        expected: u64,
        /// Transaction nonce.
        actual: u64,
    },

    /// Sender cannot pay for gas and value.
    #[error("insufficient funds for gas * price + value")]
    InsufficientFunds,

    /// Any other engine-reported fatal error.
    #[error("engine error: {0}")]
    Engine(String),
}

/// Sender recovery / message construction errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// Signature does not recover to a valid public key.
    #[error("invalid transaction signature")]
    InvalidSignature,

    /// Replay-protected signature for a different chain.
    #[error("invalid chain id: expected {expected}, got {actual}")]
    InvalidChainId {
        /// Configured chain id.
        expected: u64,
        /// Chain id encoded in `v`.
        actual: u64,
    },
}

/// Consensus engine finalization errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("consensus error: {0}")]
pub struct ConsensusError(pub String);

// =============================================================================
// PERSISTENCE ERRORS
// =============================================================================

/// Errors raised by a document store or its connector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Could not open a session.
    #[error("dial failed: {0}")]
    Dial(String),

    /// The session dropped or the handle went stale.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Insert rejected: a document with the same key already exists.
    #[error("duplicate key {key} in collection {collection}")]
    DuplicateKey {
        /// Collection name.
        collection: String,
        /// Natural key (tx hash).
        key: String,
    },

    /// Update target does not exist.
    #[error("document {key} not found in collection {collection}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Natural key (tx hash).
        key: String,
    },

    /// Store-side query or write failure.
    #[error("store query failed: {0}")]
    Query(String),

    /// Document (de)serialization failed.
    #[error("document encoding failed: {0}")]
    Encoding(String),
}

impl StoreError {
    /// Returns true if a reconnect might cure the error.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Dial(_) | Self::Unavailable(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}

/// Errors surfaced by a persistence sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Record could not be converted into a document.
    #[error("record serialization failed: {0}")]
    Serialization(String),
}

/// Errors reading an error-log line back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeadLetterParseError {
    /// No kind tag before the first separator.
    #[error("line has no record kind")]
    MissingKind,

    /// Kind tag is not one of Transaction, Trace, Receipt.
    #[error("unknown record kind: {0}")]
    UnknownKind(String),

    /// Payload is not a valid record document.
    #[error("invalid record payload: {0}")]
    InvalidPayload(String),

    /// Payload is not followed by an error field.
    #[error("line has no error field")]
    MissingError,

    /// Line was written after the record itself failed to serialize; only
    /// its key survives.
    #[error("record {tx_hash} of kind {kind} has no payload: {error}")]
    NoPayload {
        /// Kind tag as written.
        kind: String,
        /// Transaction hash.
        tx_hash: String,
        /// Serialization error text.
        error: String,
    },
}

// =============================================================================
// CONFIGURATION ERRORS
// =============================================================================

/// Configuration loading / validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A file could not be read or opened.
    #[error("cannot access {path}: {error}")]
    Io {
        /// Path of the file.
        path: String,
        /// Error message from the I/O operation.
        error: String,
    },

    /// TOML could not be parsed.
    #[error("config parse error: {0}")]
    Parse(String),

    /// An environment variable holds an unusable value.
    #[error("invalid value for {name}: {value}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },

    /// Semantically invalid configuration.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
