//! # Index Key Layout
//!
//! Every ledger shares one index database. Keys are namespaced twice:
//!
//! ```text
//! <ledger_id> 0x00 <prefix> <suffix>
//! ```
//!
//! The ledger namespace is applied by the index handle, so the builders below
//! only produce `<prefix> <suffix>`. Ledger ids never contain `0x00`, which
//! keeps one ledger's namespace from being a prefix of another's.
//!
//! | Prefix | Suffix | Value |
//! |--------|--------|-------|
//! | `n` | block number (u64 BE) | `Location` |
//! | `h` | block hash | block number |
//! | `t` | uvarint(len) tx_id, block number (u64 BE), tx number (u64 BE) | `TxIndexValue` |
//! | `m` | `checkpoint` | `CheckpointInfo` |
//! | `m` | `index-checkpoint` | last indexed block number |
//!
//! Big-endian numbers make the engine's byte order equal numeric order, so a
//! scan over one tx id yields its occurrences by ascending (block, tx).

use ledger_types::wire::{put_raw_bytes, WireReader};

const LEDGER_SEPARATOR: u8 = 0x00;

/// Key namespaces inside one ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPrefix {
    /// Block number to block location.
    BlockNumber,
    /// Block hash to block number.
    BlockHash,
    /// Transaction id (plus position) to transaction location.
    TxId,
    /// Checkpoints.
    Metadata,
}

impl KeyPrefix {
    pub fn as_byte(&self) -> u8 {
        match self {
            KeyPrefix::BlockNumber => b'n',
            KeyPrefix::BlockHash => b'h',
            KeyPrefix::TxId => b't',
            KeyPrefix::Metadata => b'm',
        }
    }

    /// Build a key with the given suffix.
    pub fn key(&self, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(1 + suffix.len());
        key.push(self.as_byte());
        key.extend_from_slice(suffix);
        key
    }

    pub fn block_number_key(number: u64) -> Vec<u8> {
        KeyPrefix::BlockNumber.key(&number.to_be_bytes())
    }

    pub fn block_hash_key(hash: &[u8]) -> Vec<u8> {
        KeyPrefix::BlockHash.key(hash)
    }

    /// Prefix shared by every occurrence of `tx_id`.
    ///
    /// The id is length-prefixed so that scanning for `tx1` never matches
    /// `tx10`.
    pub fn tx_id_prefix(tx_id: &str) -> Vec<u8> {
        let mut key = vec![KeyPrefix::TxId.as_byte()];
        put_raw_bytes(&mut key, tx_id.as_bytes());
        key
    }

    pub fn tx_key(tx_id: &str, block_num: u64, tx_num: u64) -> Vec<u8> {
        let mut key = Self::tx_id_prefix(tx_id);
        key.extend_from_slice(&block_num.to_be_bytes());
        key.extend_from_slice(&tx_num.to_be_bytes());
        key
    }

    pub fn checkpoint_key() -> Vec<u8> {
        KeyPrefix::Metadata.key(b"checkpoint")
    }

    pub fn index_checkpoint_key() -> Vec<u8> {
        KeyPrefix::Metadata.key(b"index-checkpoint")
    }
}

/// Split a transaction key into `(tx_id, block_num, tx_num)`.
pub fn parse_tx_key(key: &[u8]) -> Option<(String, u64, u64)> {
    let (&prefix, rest) = key.split_first()?;
    if prefix != KeyPrefix::TxId.as_byte() {
        return None;
    }
    let mut reader = WireReader::new(rest);
    let tx_id = std::str::from_utf8(reader.read_raw_bytes().ok()?).ok()?;
    let block_num = reader.take(8, "block number").ok()?;
    let tx_num = reader.take(8, "tx number").ok()?;
    if !reader.is_empty() {
        return None;
    }
    Some((
        tx_id.to_string(),
        u64::from_be_bytes(block_num.try_into().ok()?),
        u64::from_be_bytes(tx_num.try_into().ok()?),
    ))
}

/// Namespace prefix of one ledger inside the shared index.
pub fn ledger_namespace(ledger_id: &str) -> Vec<u8> {
    let mut ns = Vec::with_capacity(ledger_id.len() + 1);
    ns.extend_from_slice(ledger_id.as_bytes());
    ns.push(LEDGER_SEPARATOR);
    ns
}

/// Full key of `key` within `ledger_id`'s namespace.
pub fn ledger_key(ledger_id: &str, key: &[u8]) -> Vec<u8> {
    let mut full = ledger_namespace(ledger_id);
    full.extend_from_slice(key);
    full
}
