//! # Receipt Builder
//!
//! Assembles the receipt for one executed transaction. Pure: everything it
//! needs is passed in, nothing is looked up.

use crate::domain::entities::{
    ExecutionOutcome, Header, Message, Receipt, ReceiptStatus, Transaction,
};
use crate::domain::services::{compute_contract_address, logs_bloom};
use crate::domain::value_objects::Hash;

/// Inputs gathered by the apply step for one transaction.
#[derive(Debug)]
pub struct ReceiptBuilder<'a> {
    header: &'a Header,
    tx: &'a Transaction,
    msg: &'a Message,
    tx_index: usize,
    post_state: Option<Hash>,
}

impl<'a> ReceiptBuilder<'a> {
    /// Starts a receipt for `tx` (recovered as `msg`) at `tx_index`.
    #[must_use]
    pub fn new(header: &'a Header, tx: &'a Transaction, msg: &'a Message, tx_index: usize) -> Self {
        Self {
            header,
            tx,
            msg,
            tx_index,
            post_state: None,
        }
    }

    /// Records the intermediate state root (pre-Byzantium blocks only).
    #[must_use]
    pub fn post_state(mut self, root: Option<Hash>) -> Self {
        self.post_state = root;
        self
    }

    /// Builds the receipt.
    ///
    /// `cumulative_gas_used` must already include `outcome.gas_used`. The
    /// contract address is derived from the origin and the transaction nonce
    /// only when the message has no recipient.
    #[must_use]
    pub fn build(self, outcome: &ExecutionOutcome, cumulative_gas_used: u64) -> Receipt {
        let status = if outcome.failed {
            ReceiptStatus::Failed
        } else {
            ReceiptStatus::Successful
        };

        let contract_address = self
            .msg
            .to
            .is_none()
            .then(|| compute_contract_address(self.msg.from, self.tx.nonce));

        Receipt {
            post_state: self.post_state,
            status,
            cumulative_gas_used,
            bloom: logs_bloom(&outcome.logs),
            logs: outcome.logs.clone(),
            tx_hash: self.tx.hash,
            contract_address,
            gas_used: outcome.gas_used,
            block_hash: self.header.hash,
            block_number: self.header.number,
            transaction_index: self.tx_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Log;
    use crate::domain::value_objects::{Address, Bytes, U256};

    fn message(to: Option<Address>) -> Message {
        Message {
            from: Address::new([0x0a; 20]),
            to,
            nonce: 3,
            value: U256::zero(),
            gas: 100_000,
            gas_price: U256::one(),
            data: Bytes::new(),
        }
    }

    #[test]
    fn test_call_receipt_has_no_contract_address() {
        let header = Header::default();
        let to = Some(Address::new([0x0b; 20]));
        let tx = Transaction {
            to,
            nonce: 3,
            ..Transaction::default()
        };
        let msg = message(to);

        let receipt =
            ReceiptBuilder::new(&header, &tx, &msg, 0).build(&ExecutionOutcome::success(21_000), 21_000);

        assert!(receipt.succeeded());
        assert_eq!(receipt.contract_address, None);
        assert_eq!(receipt.gas_used, 21_000);
        assert!(receipt.bloom.is_zero());
    }

    #[test]
    fn test_creation_receipt_derives_address_from_origin_and_nonce() {
        let header = Header::default();
        let tx = Transaction {
            nonce: 3,
            ..Transaction::default()
        };
        let msg = message(None);

        let receipt =
            ReceiptBuilder::new(&header, &tx, &msg, 2).build(&ExecutionOutcome::success(53_000), 74_000);

        assert_eq!(
            receipt.contract_address,
            Some(compute_contract_address(msg.from, 3))
        );
        assert_eq!(receipt.transaction_index, 2);
        assert_eq!(receipt.cumulative_gas_used, 74_000);
    }

    #[test]
    fn test_failed_outcome_and_logs() {
        let header = Header {
            number: 9,
            ..Header::default()
        };
        let tx = Transaction::default();
        let msg = message(Some(Address::new([1u8; 20])));
        let log = Log::new(Address::new([4u8; 20]), vec![], Bytes::new());
        let outcome = ExecutionOutcome::reverted(30_000, "revert").with_logs(vec![log.clone()]);

        let receipt = ReceiptBuilder::new(&header, &tx, &msg, 1)
            .post_state(Some(Hash::new([8u8; 32])))
            .build(&outcome, 51_000);

        assert_eq!(receipt.status, ReceiptStatus::Failed);
        assert_eq!(receipt.post_state, Some(Hash::new([8u8; 32])));
        assert_eq!(receipt.block_number, 9);
        assert_eq!(receipt.logs, vec![log.clone()]);
        assert!(receipt.bloom.contains_input(log.address.as_bytes()));
    }
}
