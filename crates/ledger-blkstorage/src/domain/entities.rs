//! # Domain Entities
//!
//! Positions inside the block files and the records the index keeps about
//! them.

use std::fmt;

use ledger_types::{BlockHeader, BlockMetadata};
use serde::{Deserialize, Serialize};

/// A byte range inside one rolling block file.
///
/// For a block, `offset`/`length` cover the encoded block bytes, excluding the
/// record's length prefix and checksum trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file_id: u32,
    pub offset: u64,
    pub length: u32,
}

impl Location {
    pub fn new(file_id: u32, offset: u64, length: u32) -> Self {
        Self {
            file_id,
            offset,
            length,
        }
    }

    /// Offset of the first byte past this range.
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.length)
    }

    /// Narrow a block location down to a range inside the block bytes.
    pub fn slice(&self, range: &TxRange) -> Location {
        Location {
            file_id: self.file_id,
            offset: self.offset + range.offset,
            length: range.length,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file {} offset {} length {}",
            self.file_id, self.offset, self.length
        )
    }
}

/// Byte range of one envelope, relative to the start of the encoded block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRange {
    pub offset: u64,
    pub length: u32,
}

/// Where a transaction sits inside its block, plus its id.
///
/// `tx_id` is empty when the envelope could not be decoded far enough to
/// reach the channel header. The range is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOffset {
    pub tx_id: String,
    pub range: TxRange,
}

/// Everything the index needs from a block, derived while encoding it or
/// recovered from the stored bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedBlockInfo {
    pub block_header: BlockHeader,
    pub tx_offsets: Vec<TxOffset>,
    pub metadata: BlockMetadata,
}

impl SerializedBlockInfo {
    pub fn block_number(&self) -> u64 {
        self.block_header.number
    }
}

/// The last position the block files were durably written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub latest_file_id: u32,
    pub latest_file_size: u64,
    pub latest_block_number: u64,
    pub latest_block_hash: Vec<u8>,
    pub is_chain_empty: bool,
}

impl Default for CheckpointInfo {
    fn default() -> Self {
        Self {
            latest_file_id: 0,
            latest_file_size: 0,
            latest_block_number: 0,
            latest_block_hash: Vec::new(),
            is_chain_empty: true,
        }
    }
}

impl CheckpointInfo {
    /// Number the next appended block must carry.
    pub fn next_block_number(&self) -> u64 {
        if self.is_chain_empty {
            0
        } else {
            self.latest_block_number + 1
        }
    }
}

/// Index value stored under a transaction key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIndexValue {
    pub location: Location,
    pub validation_code: u8,
}

/// Summary of a ledger's chain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockchainInfo {
    /// Number of blocks, i.e. the next block number.
    pub height: u64,
    pub current_block_hash: Vec<u8>,
    pub previous_block_hash: Vec<u8>,
}
