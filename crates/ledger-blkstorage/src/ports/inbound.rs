//! # Inbound Ports (Driving Ports)
//!
//! The API one ledger's block store exposes to the ordering and delivery
//! paths.

use ledger_types::{Block, TxValidationCode};

use crate::domain::entities::BlockchainInfo;
use crate::domain::errors::StorageError;

/// Maximum number of blocks returned by one `retrieve_blocks` call.
pub const MAX_BLOCKS_PER_RANGE: usize = 100;

/// Per-ledger block store.
///
/// Writes are serialized per ledger. Reads may run concurrently with each
/// other and with the writer; a read never observes a block whose write has
/// not completed.
pub trait BlockStoreApi: Send + Sync {
    /// Append a block and make it durable before returning.
    ///
    /// ## Errors
    ///
    /// - `UnexpectedBlockNumber`: the block is not the next in sequence
    /// - `PreviousHashMismatch`: the block does not chain onto the tip
    /// - `Io` / `Database`: the write failed; the store will refuse further
    ///   writes until it is reopened
    fn add_block(&self, block: &Block) -> Result<(), StorageError>;

    /// Append a block without forcing it to stable storage.
    ///
    /// The block is readable immediately. It is durable only after the next
    /// [`flush`](Self::flush), whether explicit or triggered by the configured
    /// flush interval.
    fn add_block_no_sync(&self, block: &Block) -> Result<(), StorageError>;

    /// Force buffered block bytes to disk, then commit the pending index
    /// entries and checkpoint.
    fn flush(&self) -> Result<(), StorageError>;

    /// Height and tip hashes of the chain.
    fn get_blockchain_info(&self) -> Result<BlockchainInfo, StorageError>;

    /// ## Errors
    ///
    /// - `BlockNumberNotFound`: no block with this number
    /// - `CorruptIndexValue` / `ChecksumMismatch` / `BlockDecode`: stored data is damaged
    fn retrieve_block_by_number(&self, number: u64) -> Result<Block, StorageError>;

    fn retrieve_block_by_hash(&self, hash: &[u8]) -> Result<Block, StorageError>;

    /// Read up to `limit` consecutive blocks starting at `start`.
    ///
    /// `limit` is capped at [`MAX_BLOCKS_PER_RANGE`]; fewer blocks are
    /// returned when the chain ends first.
    ///
    /// ## Errors
    ///
    /// - `BlockNumberNotFound`: `start` is past the tip
    fn retrieve_blocks(&self, start: u64, limit: usize) -> Result<Vec<Block>, StorageError>;

    /// Envelope bytes of the first transaction carrying `tx_id`.
    ///
    /// When several transactions share an id, the one with the lowest
    /// (block number, tx number) wins.
    fn retrieve_tx_by_id(&self, tx_id: &str) -> Result<Vec<u8>, StorageError>;

    /// Envelope bytes of transaction `tx_num` in block `block_num`.
    fn retrieve_tx_by_block_num_tx_num(
        &self,
        block_num: u64,
        tx_num: u64,
    ) -> Result<Vec<u8>, StorageError>;

    /// The block holding the first transaction carrying `tx_id`.
    fn retrieve_block_by_tx_id(&self, tx_id: &str) -> Result<Block, StorageError>;

    /// Validation code recorded for the first transaction carrying `tx_id`.
    fn retrieve_tx_validation_code_by_tx_id(
        &self,
        tx_id: &str,
    ) -> Result<TxValidationCode, StorageError>;

    fn tx_id_exists(&self, tx_id: &str) -> Result<bool, StorageError>;

    /// Flush pending writes, close block files and release the index handle.
    ///
    /// Further calls fail with `StoreClosed`. Shutting down twice is a no-op.
    fn shutdown(&self) -> Result<(), StorageError>;
}
