//! # Domain Services
//!
//! Pure helper functions: hashing, CREATE address derivation and bloom
//! construction. No I/O.

use crate::domain::entities::{Log, Receipt};
use crate::domain::value_objects::{Address, Bloom, Hash};
use sha3::{Digest, Keccak256};

/// Computes keccak256 hash of data.
#[must_use]
pub fn keccak256(data: &[u8]) -> Hash {
    Hash::new(Keccak256::digest(data).into())
}

/// Computes the address of a contract created by `sender` at `nonce`.
///
/// Address = keccak256(rlp(\[sender, nonce\]))\[12:\]
#[must_use]
pub fn compute_contract_address(sender: Address, nonce: u64) -> Address {
    let mut content = Vec::with_capacity(30);

    // 20-byte string: 0x80 + 20
    content.push(0x94);
    content.extend_from_slice(sender.as_bytes());

    if nonce == 0 {
        content.push(0x80);
    } else if nonce < 0x80 {
        content.push(nonce as u8);
    } else {
        let nonce_be = nonce.to_be_bytes();
        let nonce_bytes = trim_leading_zeros(&nonce_be);
        content.push(0x80 + nonce_bytes.len() as u8);
        content.extend_from_slice(nonce_bytes);
    }

    // Payload is at most 30 bytes, so the short list header always applies.
    let mut rlp = Vec::with_capacity(content.len() + 1);
    rlp.push(0xc0 + content.len() as u8);
    rlp.extend_from_slice(&content);

    let hash = Keccak256::digest(&rlp);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..32]);
    Address::new(addr)
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Bloom over the addresses and topics of `logs`.
#[must_use]
pub fn logs_bloom(logs: &[Log]) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for log in logs {
        bloom.accrue(log.address.as_bytes());
        for topic in &log.topics {
            bloom.accrue(topic.as_bytes());
        }
    }
    bloom
}

/// Bloom over every log of every receipt.
#[must_use]
pub fn receipts_bloom(receipts: &[Receipt]) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for receipt in receipts {
        bloom.accrue_bloom(&logs_bloom(&receipt.logs));
    }
    bloom
}
