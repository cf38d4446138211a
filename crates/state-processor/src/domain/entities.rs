//! # Core Domain Entities
//!
//! Blocks and transactions are read-only inputs sourced from the chain.
//! Execution outcomes and receipts are produced once per transaction by the
//! processor and handed back to the block-level aggregator.

use crate::domain::value_objects::{Address, Bloom, Bytes, Hash, U256};
use serde::{Deserialize, Serialize};

// =============================================================================
// BLOCK
// =============================================================================

/// Block header fields consumed by the processor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: Hash,
    /// Block gas limit (seeds the gas pool).
    pub gas_limit: u64,
    /// Beneficiary of block rewards.
    pub coinbase: Address,
    /// Block timestamp (unix seconds).
    pub timestamp: u64,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            number: 0,
            hash: Hash::ZERO,
            gas_limit: 8_000_000,
            coinbase: Address::ZERO,
            timestamp: 0,
        }
    }
}

/// An immutable block: header, ordered transactions and uncle headers.
#[derive(Clone, Debug, Default)]
pub struct Block {
    /// Block header.
    pub header: Header,
    /// Transactions in execution order.
    pub transactions: Vec<Transaction>,
    /// Uncle headers (handed to consensus finalization untouched).
    pub uncles: Vec<Header>,
}

impl Block {
    /// Creates a block without uncles.
    #[must_use]
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
            uncles: Vec::new(),
        }
    }

    /// Block number.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Block hash.
    #[must_use]
    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    /// Block gas limit.
    #[must_use]
    pub fn gas_limit(&self) -> u64 {
        self.header.gas_limit
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

/// ECDSA signature components as carried by a signed transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    /// Recovery id (with chain id folded in for EIP-155 transactions).
    pub v: U256,
    /// Signature r.
    pub r: U256,
    /// Signature s.
    pub s: U256,
}

/// A signed transaction as it appears in a block.
///
/// The sender is not stored; it is recovered while building the [`Message`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction hash.
    pub hash: Hash,
    /// Recipient. `None` signals contract creation.
    pub to: Option<Address>,
    /// Sender nonce.
    pub nonce: u64,
    /// Gas limit.
    pub gas: u64,
    /// Gas price in wei.
    pub gas_price: U256,
    /// Value transferred in wei.
    pub value: U256,
    /// Calldata or init code.
    pub input: Bytes,
    /// Signature components.
    pub signature: Signature,
}

impl Transaction {
    /// Returns true if this transaction deploys a contract.
    #[must_use]
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            hash: Hash::ZERO,
            to: None,
            nonce: 0,
            gas: 21_000,
            gas_price: U256::from(1_000_000_000u64),
            value: U256::zero(),
            input: Bytes::new(),
            signature: Signature::default(),
        }
    }
}

/// Execution message derived from a transaction after sender recovery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    /// Recovered sender.
    pub from: Address,
    /// Recipient (`None` for contract creation).
    pub to: Option<Address>,
    /// Sender nonce.
    pub nonce: u64,
    /// Value transferred.
    pub value: U256,
    /// Gas limit.
    pub gas: u64,
    /// Gas price.
    pub gas_price: U256,
    /// Calldata.
    pub data: Bytes,
}

// =============================================================================
// EXECUTION
// =============================================================================

/// Opaque per-call execution configuration forwarded to the engine.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VmConfig {
    /// Enable engine-side debug output.
    pub debug: bool,
    /// Disable nested calls (used by some replay tools).
    pub no_recursion: bool,
}

/// Per-transaction execution context handed to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxContext {
    /// Transaction origin (recovered sender).
    pub origin: Address,
    /// Gas price of the transaction.
    pub gas_price: U256,
    /// Block coinbase.
    pub coinbase: Address,
    /// Block number.
    pub block_number: u64,
    /// Block timestamp.
    pub timestamp: u64,
    /// Block gas limit.
    pub block_gas_limit: u64,
    /// Hash of the transaction being executed.
    pub tx_hash: Hash,
    /// Hash of the enclosing block.
    pub block_hash: Hash,
    /// Position of the transaction inside the block.
    pub tx_index: usize,
}

impl TxContext {
    /// Builds the execution context for `msg` at position `tx_index` of the
    /// block described by `header`.
    #[must_use]
    pub fn new(msg: &Message, header: &Header, tx_hash: Hash, tx_index: usize) -> Self {
        Self {
            origin: msg.from,
            gas_price: msg.gas_price,
            coinbase: header.coinbase,
            block_number: header.number,
            timestamp: header.timestamp,
            block_gas_limit: header.gas_limit,
            tx_hash,
            block_hash: header.hash,
            tx_index,
        }
    }
}

/// Emitted log (event).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Contract address that emitted the log.
    pub address: Address,
    /// Indexed topics (up to 4).
    pub topics: Vec<Hash>,
    /// Non-indexed data.
    pub data: Bytes,
}

impl Log {
    /// Creates a new log.
    #[must_use]
    pub fn new(address: Address, topics: Vec<Hash>, data: Bytes) -> Self {
        Self {
            address,
            topics,
            data,
        }
    }
}

/// What the execution engine reports for one transaction.
///
/// `failed` marks a consensus-valid failure (revert, out of gas inside the
/// call). Block-fatal problems are reported through `ExecutionError` instead.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Gas consumed by the transaction.
    pub gas_used: u64,
    /// True if execution reverted or otherwise failed inside the VM.
    pub failed: bool,
    /// Logs emitted during execution.
    pub logs: Vec<Log>,
    /// VM-reported failure text, if any.
    pub vm_error: Option<String>,
}

impl ExecutionOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn success(gas_used: u64) -> Self {
        Self {
            gas_used,
            ..Self::default()
        }
    }

    /// A failed (reverted) outcome.
    #[must_use]
    pub fn reverted(gas_used: u64, reason: impl Into<String>) -> Self {
        Self {
            gas_used,
            failed: true,
            logs: Vec::new(),
            vm_error: Some(reason.into()),
        }
    }

    /// Attaches logs.
    #[must_use]
    pub fn with_logs(mut self, logs: Vec<Log>) -> Self {
        self.logs = logs;
        self
    }
}

// =============================================================================
// RECEIPT
// =============================================================================

/// Receipt status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptStatus {
    /// Execution failed (status 0).
    Failed,
    /// Execution succeeded (status 1).
    Successful,
}

impl ReceiptStatus {
    /// Numeric status code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Failed => 0,
            Self::Successful => 1,
        }
    }
}

/// Receipt for one executed transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Intermediate state root (only before Byzantium).
    pub post_state: Option<Hash>,
    /// Execution status.
    pub status: ReceiptStatus,
    /// Gas used by this and all preceding transactions of the block.
    pub cumulative_gas_used: u64,
    /// Log bloom over this receipt's logs.
    pub bloom: Bloom,
    /// Logs emitted.
    pub logs: Vec<Log>,
    /// Transaction hash.
    pub tx_hash: Hash,
    /// Created contract (contract creation only).
    pub contract_address: Option<Address>,
    /// Gas used by this transaction alone.
    pub gas_used: u64,
    /// Enclosing block hash.
    pub block_hash: Hash,
    /// Enclosing block number.
    pub block_number: u64,
    /// Position inside the block.
    pub transaction_index: usize,
}

impl Receipt {
    /// Returns true if the transaction succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == ReceiptStatus::Successful
    }
}

/// Result of processing a whole block.
#[derive(Clone, Debug, Default)]
pub struct ProcessOutput {
    /// One receipt per transaction, in block order.
    pub receipts: Vec<Receipt>,
    /// All logs of the block, concatenated in transaction order.
    pub logs: Vec<Log>,
    /// Total gas consumed by the block.
    pub gas_used: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_creation_flag() {
        let tx = Transaction::default();
        assert!(tx.is_contract_creation());

        let tx = Transaction {
            to: Some(Address::new([1u8; 20])),
            ..Transaction::default()
        };
        assert!(!tx.is_contract_creation());
    }

    #[test]
    fn test_tx_context_copies_block_fields() {
        let header = Header {
            number: 42,
            hash: Hash::new([9u8; 32]),
            coinbase: Address::new([3u8; 20]),
            ..Header::default()
        };
        let msg = Message {
            from: Address::new([1u8; 20]),
            to: None,
            nonce: 0,
            value: U256::zero(),
            gas: 21_000,
            gas_price: U256::from(7u64),
            data: Bytes::new(),
        };

        let ctx = TxContext::new(&msg, &header, Hash::new([5u8; 32]), 3);
        assert_eq!(ctx.origin, msg.from);
        assert_eq!(ctx.block_number, 42);
        assert_eq!(ctx.block_hash, header.hash);
        assert_eq!(ctx.tx_index, 3);
        assert_eq!(ctx.gas_price, U256::from(7u64));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ReceiptStatus::Failed.code(), 0);
        assert_eq!(ReceiptStatus::Successful.code(), 1);
    }

    #[test]
    fn test_reverted_outcome() {
        let outcome = ExecutionOutcome::reverted(30_000, "execution reverted");
        assert!(outcome.failed);
        assert_eq!(outcome.vm_error.as_deref(), Some("execution reverted"));
    }
}
