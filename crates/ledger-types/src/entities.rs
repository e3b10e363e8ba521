//! # Core Ledger Entities
//!
//! A block is an already-finalized unit produced by ordering: a header that
//! chains it to its predecessor, the ordered transaction envelopes, and a
//! metadata map filled in by the committer (signatures, the per-transaction
//! validation codes, ...).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::wire::{put_raw_bytes, put_uvarint};

/// Metadata entry holding one validation code byte per transaction.
pub const TRANSACTIONS_FILTER: &str = "TRANSACTIONS_FILTER";

/// Metadata entry holding the orderer signatures over the block.
pub const SIGNATURES: &str = "SIGNATURES";

/// Metadata entry pointing at the last configuration block.
pub const LAST_CONFIG: &str = "LAST_CONFIG";

/// The header of a block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Position of the block in its ledger, starting at 0.
    pub number: u64,
    /// Hash of the previous block's header (empty for block 0).
    pub previous_hash: Vec<u8>,
    /// Hash over the block's transaction envelopes.
    pub data_hash: Vec<u8>,
}

impl BlockHeader {
    /// Canonical byte form used for hashing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.previous_hash.len() + self.data_hash.len());
        put_uvarint(&mut buf, self.number);
        put_raw_bytes(&mut buf, &self.previous_hash);
        put_raw_bytes(&mut buf, &self.data_hash);
        buf
    }

    /// SHA-256 over the canonical header bytes.
    ///
    /// This is the value the next block carries as `previous_hash` and the key
    /// used for hash lookups.
    pub fn hash(&self) -> Vec<u8> {
        Sha256::digest(self.to_bytes()).to_vec()
    }
}

/// The ordered transaction envelopes of a block, carried as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockData {
    pub data: Vec<Vec<u8>>,
}

impl BlockData {
    pub fn new(data: Vec<Vec<u8>>) -> Self {
        Self { data }
    }

    /// SHA-256 over the concatenated envelopes.
    pub fn hash(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        for envelope in &self.data {
            hasher.update(envelope);
        }
        hasher.finalize().to_vec()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Named metadata entries attached to a block.
///
/// Entries are kept sorted by name so the encoded form is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub entries: BTreeMap<String, Vec<u8>>,
}

impl BlockMetadata {
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Vec<u8>) {
        self.entries.insert(name.into(), value);
    }

    /// Validation code recorded for transaction `tx_num`, if present.
    pub fn tx_validation_code(&self, tx_num: usize) -> Option<TxValidationCode> {
        self.get(TRANSACTIONS_FILTER)
            .and_then(|filter| filter.get(tx_num))
            .map(|code| TxValidationCode(*code))
    }
}

/// A ledger block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub data: BlockData,
    pub metadata: BlockMetadata,
}

impl Block {
    /// Build a block over `envelopes`, computing the data hash and marking
    /// every transaction as not yet validated.
    pub fn new(number: u64, previous_hash: Vec<u8>, envelopes: Vec<Vec<u8>>) -> Self {
        let data = BlockData::new(envelopes);
        let mut metadata = BlockMetadata::default();
        metadata.set(
            TRANSACTIONS_FILTER,
            vec![TxValidationCode::NOT_VALIDATED.0; data.len()],
        );
        Self {
            header: BlockHeader {
                number,
                previous_hash,
                data_hash: data.hash(),
            },
            data,
            metadata,
        }
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn hash(&self) -> Vec<u8> {
        self.header.hash()
    }

    /// Replace the transaction filter with the given codes.
    pub fn set_validation_codes(&mut self, codes: &[TxValidationCode]) {
        self.metadata
            .set(TRANSACTIONS_FILTER, codes.iter().map(|c| c.0).collect());
    }

    /// Validation code of transaction `tx_num`.
    ///
    /// A missing or short filter reads as `NOT_VALIDATED`.
    pub fn tx_validation_code(&self, tx_num: usize) -> TxValidationCode {
        self.metadata
            .tx_validation_code(tx_num)
            .unwrap_or(TxValidationCode::NOT_VALIDATED)
    }
}

/// Outcome of validating one transaction, stored as a single byte.
///
/// Unknown byte values are preserved as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxValidationCode(pub u8);

impl TxValidationCode {
    pub const VALID: Self = Self(0);
    pub const NIL_ENVELOPE: Self = Self(1);
    pub const BAD_PAYLOAD: Self = Self(2);
    pub const BAD_COMMON_HEADER: Self = Self(3);
    pub const BAD_CREATOR_SIGNATURE: Self = Self(4);
    pub const INVALID_ENDORSER_TRANSACTION: Self = Self(5);
    pub const INVALID_CONFIG_TRANSACTION: Self = Self(6);
    pub const UNSUPPORTED_TX_PAYLOAD: Self = Self(7);
    pub const BAD_PROPOSAL_TXID: Self = Self(8);
    pub const DUPLICATE_TXID: Self = Self(9);
    pub const ENDORSEMENT_POLICY_FAILURE: Self = Self(10);
    pub const MVCC_READ_CONFLICT: Self = Self(11);
    pub const PHANTOM_READ_CONFLICT: Self = Self(12);
    pub const UNKNOWN_TX_TYPE: Self = Self(13);
    pub const BAD_CHANNEL_HEADER: Self = Self(20);
    pub const NOT_VALIDATED: Self = Self(254);
    pub const INVALID_OTHER_REASON: Self = Self(255);

    pub fn is_valid(self) -> bool {
        self == Self::VALID
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "VALID",
            1 => "NIL_ENVELOPE",
            2 => "BAD_PAYLOAD",
            3 => "BAD_COMMON_HEADER",
            4 => "BAD_CREATOR_SIGNATURE",
            5 => "INVALID_ENDORSER_TRANSACTION",
            6 => "INVALID_CONFIG_TRANSACTION",
            7 => "UNSUPPORTED_TX_PAYLOAD",
            8 => "BAD_PROPOSAL_TXID",
            9 => "DUPLICATE_TXID",
            10 => "ENDORSEMENT_POLICY_FAILURE",
            11 => "MVCC_READ_CONFLICT",
            12 => "PHANTOM_READ_CONFLICT",
            13 => "UNKNOWN_TX_TYPE",
            20 => "BAD_CHANNEL_HEADER",
            254 => "NOT_VALIDATED",
            255 => "INVALID_OTHER_REASON",
            _ => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for TxValidationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_new_computes_data_hash() {
        let block = Block::new(3, vec![0xAB; 32], vec![b"tx-a".to_vec(), b"tx-b".to_vec()]);

        let mut hasher = Sha256::new();
        hasher.update(b"tx-a");
        hasher.update(b"tx-b");
        assert_eq!(block.header.data_hash, hasher.finalize().to_vec());
        assert_eq!(block.number(), 3);
    }

    #[test]
    fn test_header_hash_changes_with_number() {
        let a = BlockHeader {
            number: 1,
            previous_hash: vec![1; 32],
            data_hash: vec![2; 32],
        };
        let mut b = a.clone();
        b.number = 2;

        assert_eq!(a.hash().len(), 32);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.clone().hash());
    }

    #[test]
    fn test_validation_codes_default_to_not_validated() {
        let mut block = Block::new(0, vec![], vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(block.tx_validation_code(1), TxValidationCode::NOT_VALIDATED);

        block.set_validation_codes(&[TxValidationCode::VALID, TxValidationCode::MVCC_READ_CONFLICT]);
        assert!(block.tx_validation_code(0).is_valid());
        assert_eq!(block.tx_validation_code(1), TxValidationCode::MVCC_READ_CONFLICT);
        assert_eq!(block.tx_validation_code(7), TxValidationCode::NOT_VALIDATED);
    }

    #[test]
    fn test_validation_code_display() {
        assert_eq!(TxValidationCode::VALID.to_string(), "VALID(0)");
        assert_eq!(TxValidationCode(77).to_string(), "UNKNOWN(77)");
    }
}
