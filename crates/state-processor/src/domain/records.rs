//! # Persisted Records
//!
//! The three record kinds written to the document store. Field names are the
//! persisted document keys; numeric fields are stringified the way downstream
//! consumers of the collections expect (decimal for gas and value, `0x` hex
//! for nonce, signature and index).

use crate::domain::entities::{Header, Log, Message, Receipt, Transaction};
use crate::domain::trace::TraceRecord;
use crate::domain::value_objects::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A schema-on-write document.
pub type Document = serde_json::Value;

/// Applies `update` to `stored` field by field: keys present in `update`
/// overwrite, every other stored key is kept. A non-object on either side
/// replaces the stored document wholesale.
pub fn merge_fields(stored: &mut Document, update: Document) {
    match (stored, update) {
        (Document::Object(fields), Document::Object(changes)) => fields.extend(changes),
        (stored, update) => *stored = update,
    }
}

/// Recipient recorded for contract-creation transactions.
pub const CREATION_RECIPIENT: &str = "0x0";

// =============================================================================
// RECORD KIND
// =============================================================================

/// The three record kinds, one collection each.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Transaction metadata.
    Transaction,
    /// Execution trace.
    Trace,
    /// Receipt.
    Receipt,
}

impl RecordKind {
    /// All kinds, in flush order.
    pub const ALL: [RecordKind; 3] = [Self::Transaction, Self::Trace, Self::Receipt];

    /// Collection name in the document store.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Transaction => "transaction",
            Self::Trace => "trace",
            Self::Receipt => "receipt",
        }
    }

    /// Tag used in error-log lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Transaction => "Transaction",
            Self::Trace => "Trace",
            Self::Receipt => "Receipt",
        }
    }

    /// Document field holding the natural key.
    #[must_use]
    pub const fn key_field(self) -> &'static str {
        match self {
            Self::Transaction | Self::Trace => "tx_hash",
            Self::Receipt => "re_txhash",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Transaction" => Ok(Self::Transaction),
            "Trace" => Ok(Self::Trace),
            "Receipt" => Ok(Self::Receipt),
            other => Err(format!("unknown record kind: {other}")),
        }
    }
}

// =============================================================================
// TRANSACTION RECORD
// =============================================================================

/// Persisted transaction metadata.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub tx_blockhash: String,
    pub tx_blocknum: String,
    pub tx_fromaddr: String,
    pub tx_gas: String,
    pub tx_gasprice: String,
    pub tx_hash: String,
    pub tx_input: String,
    pub tx_nonce: String,
    pub tx_r: String,
    pub tx_s: String,
    pub tx_toaddr: String,
    pub tx_index: String,
    pub tx_v: String,
    pub tx_value: String,
}

impl TransactionRecord {
    /// Builds the record for `tx` (recovered as `msg`) at `tx_index` of the
    /// block described by `header`.
    #[must_use]
    pub fn new(tx: &Transaction, msg: &Message, header: &Header, tx_index: usize) -> Self {
        Self {
            tx_blockhash: header.hash.to_hex(),
            tx_blocknum: header.number.to_string(),
            tx_fromaddr: msg.from.to_hex(),
            tx_gas: tx.gas.to_string(),
            tx_gasprice: tx.gas_price.to_string(),
            tx_hash: tx.hash.to_hex(),
            tx_input: tx.input.to_hex(),
            tx_nonce: format!("0x{:x}", tx.nonce),
            tx_r: format!("0x{:x}", tx.signature.r),
            tx_s: format!("0x{:x}", tx.signature.s),
            tx_toaddr: msg
                .to
                .map_or_else(|| CREATION_RECIPIENT.to_string(), |to| to.to_hex()),
            tx_index: format!("0x{tx_index:x}"),
            tx_v: format!("0x{:x}", tx.signature.v),
            tx_value: msg.value.to_string(),
        }
    }
}

// =============================================================================
// RECEIPT RECORD
// =============================================================================

/// Persisted log entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

impl From<&Log> for LogRecord {
    fn from(log: &Log) -> Self {
        Self {
            address: log.address.to_hex(),
            topics: log.topics.iter().map(|t| t.to_hex()).collect(),
            data: log.data.to_hex(),
        }
    }
}

/// Persisted receipt.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    pub re_contractaddress: String,
    pub re_cumulativegasused: String,
    pub re_gasused: String,
    #[serde(default)]
    pub re_logs: Vec<LogRecord>,
    #[serde(default)]
    pub re_logsbloom: String,
    pub re_status: String,
    pub re_txhash: String,
    /// Out-of-band failure annotation. Preserved by the merge path.
    #[serde(default)]
    pub re_failreason: String,
}

impl ReceiptRecord {
    /// Builds the record for `receipt` with the given failure annotation.
    #[must_use]
    pub fn new(receipt: &Receipt, fail_reason: impl Into<String>) -> Self {
        Self {
            re_contractaddress: receipt
                .contract_address
                .unwrap_or(Address::ZERO)
                .to_hex(),
            re_cumulativegasused: receipt.cumulative_gas_used.to_string(),
            re_gasused: receipt.gas_used.to_string(),
            re_logs: receipt.logs.iter().map(LogRecord::from).collect(),
            re_logsbloom: receipt.bloom.to_hex(),
            re_status: format!("0x{}", receipt.status.code()),
            re_txhash: receipt.tx_hash.to_hex(),
            re_failreason: fail_reason.into(),
        }
    }
}

// =============================================================================
// TAGGED RECORD
// =============================================================================

/// Any one record, tagged with its kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    /// Transaction metadata.
    Transaction(TransactionRecord),
    /// Execution trace.
    Trace(TraceRecord),
    /// Receipt.
    Receipt(ReceiptRecord),
}

impl Record {
    /// Kind of this record.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Transaction(_) => RecordKind::Transaction,
            Self::Trace(_) => RecordKind::Trace,
            Self::Receipt(_) => RecordKind::Receipt,
        }
    }

    /// Natural key (transaction hash).
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Transaction(r) => &r.tx_hash,
            Self::Trace(r) => &r.tx_hash,
            Self::Receipt(r) => &r.re_txhash,
        }
    }

    /// Converts the record into a store document.
    pub fn to_document(&self) -> Result<Document, serde_json::Error> {
        match self {
            Self::Transaction(r) => serde_json::to_value(r),
            Self::Trace(r) => serde_json::to_value(r),
            Self::Receipt(r) => serde_json::to_value(r),
        }
    }

    /// Single-line JSON form used in the error log.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Transaction(r) => serde_json::to_string(r),
            Self::Trace(r) => serde_json::to_string(r),
            Self::Receipt(r) => serde_json::to_string(r),
        }
    }

    /// Rebuilds a record of `kind` from a document.
    pub fn from_document(kind: RecordKind, doc: Document) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            RecordKind::Transaction => Self::Transaction(serde_json::from_value(doc)?),
            RecordKind::Trace => Self::Trace(serde_json::from_value(doc)?),
            RecordKind::Receipt => Self::Receipt(serde_json::from_value(doc)?),
        })
    }
}

/// The three records produced by one applied transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxRecords {
    /// Transaction metadata.
    pub transaction: TransactionRecord,
    /// Execution trace.
    pub trace: TraceRecord,
    /// Receipt.
    pub receipt: ReceiptRecord,
}

impl TxRecords {
    /// Natural key shared by all three records.
    #[must_use]
    pub fn tx_hash(&self) -> &str {
        &self.transaction.tx_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ReceiptStatus, Signature};
    use crate::domain::value_objects::{Bloom, Bytes, Hash, U256};

    fn sample_tx(to: Option<Address>) -> (Transaction, Message, Header) {
        let tx = Transaction {
            hash: Hash::new([0xaa; 32]),
            to,
            nonce: 255,
            gas: 90_000,
            gas_price: U256::from(20_000_000_000u64),
            value: U256::from(1_000u64),
            input: Bytes::from_slice(&[0x60, 0x80]),
            signature: Signature {
                v: U256::from(27u64),
                r: U256::from(0x1234u64),
                s: U256::zero(),
            },
        };
        let msg = Message {
            from: Address::new([0x01; 20]),
            to,
            nonce: tx.nonce,
            value: tx.value,
            gas: tx.gas,
            gas_price: tx.gas_price,
            data: tx.input.clone(),
        };
        let header = Header {
            number: 46_147,
            hash: Hash::new([0xbb; 32]),
            ..Header::default()
        };
        (tx, msg, header)
    }

    #[test]
    fn test_transaction_record_formatting() {
        let (tx, msg, header) = sample_tx(Some(Address::new([0x02; 20])));
        let record = TransactionRecord::new(&tx, &msg, &header, 10);

        assert_eq!(record.tx_blocknum, "46147");
        assert_eq!(record.tx_gas, "90000");
        assert_eq!(record.tx_gasprice, "20000000000");
        assert_eq!(record.tx_nonce, "0xff");
        assert_eq!(record.tx_r, "0x1234");
        assert_eq!(record.tx_s, "0x0");
        assert_eq!(record.tx_v, "0x1b");
        assert_eq!(record.tx_index, "0xa");
        assert_eq!(record.tx_input, "0x6080");
        assert_eq!(record.tx_value, "1000");
        assert_eq!(record.tx_toaddr, Address::new([0x02; 20]).to_hex());
    }

    #[test]
    fn test_creation_recipient_placeholder() {
        let (tx, msg, header) = sample_tx(None);
        let record = TransactionRecord::new(&tx, &msg, &header, 0);
        assert_eq!(record.tx_toaddr, CREATION_RECIPIENT);
    }

    #[test]
    fn test_receipt_record_formatting() {
        let receipt = Receipt {
            post_state: None,
            status: ReceiptStatus::Failed,
            cumulative_gas_used: 51_000,
            bloom: Bloom::ZERO,
            logs: Vec::new(),
            tx_hash: Hash::new([0xcc; 32]),
            contract_address: None,
            gas_used: 30_000,
            block_hash: Hash::ZERO,
            block_number: 1,
            transaction_index: 1,
        };
        let record = ReceiptRecord::new(&receipt, "execution reverted");

        assert_eq!(record.re_status, "0x0");
        assert_eq!(record.re_gasused, "30000");
        assert_eq!(record.re_cumulativegasused, "51000");
        assert_eq!(record.re_contractaddress, Address::ZERO.to_hex());
        assert_eq!(record.re_failreason, "execution reverted");
    }

    #[test]
    fn test_document_keys_match_kind() {
        let (tx, msg, header) = sample_tx(None);
        let record = Record::Transaction(TransactionRecord::new(&tx, &msg, &header, 0));
        let doc = record.to_document().unwrap();

        let key_field = record.kind().key_field();
        assert_eq!(doc[key_field].as_str(), Some(record.key()));

        let back = Record::from_document(RecordKind::Transaction, doc).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_kind_labels_parse() {
        for kind in RecordKind::ALL {
            assert_eq!(kind.label().parse::<RecordKind>(), Ok(kind));
        }
        assert!("Block".parse::<RecordKind>().is_err());
    }

    #[test]
    fn test_merge_fields_keeps_unset_keys() {
        let mut stored = serde_json::json!({
            "re_txhash": "0x01",
            "re_status": "0",
            "re_failreason": "oog",
            "annotator": "job-7"
        });
        merge_fields(
            &mut stored,
            serde_json::json!({ "re_txhash": "0x01", "re_status": "1", "re_failreason": "oog" }),
        );

        assert_eq!(stored["re_status"], "1");
        assert_eq!(stored["re_failreason"], "oog");
        assert_eq!(stored["annotator"], "job-7");
    }

}
