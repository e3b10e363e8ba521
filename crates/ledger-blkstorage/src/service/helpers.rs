//! # Service Helpers
//!
//! Block reads and the commit step shared by the write path.

use ledger_types::Block;

use super::BlockStore;
use crate::blockfile::{read_block_bytes, BlockFileWriter};
use crate::domain::codec::deserialize_block;
use crate::domain::entities::{CheckpointInfo, Location};
use crate::domain::errors::StorageError;
use crate::index::IndexBatch;

impl BlockStore {
    /// Read and decode the block stored at `location`.
    pub(crate) fn read_block_at(&self, location: Location) -> Result<Block, StorageError> {
        let bytes = read_block_bytes(&self.dir, &location)?;
        deserialize_block(&bytes).map_err(|source| StorageError::BlockDecode { location, source })
    }

    pub(crate) fn block_by_number(&self, number: u64) -> Result<Block, StorageError> {
        let location = self
            .index
            .get_location_by_number(number)?
            .ok_or(StorageError::BlockNumberNotFound { number })?;
        self.read_block_at(location)
    }

    /// Sync the block file, then commit every staged entry, `batch` and
    /// `checkpoint` in one index write.
    pub(crate) fn commit_locked(
        &self,
        writer: &mut BlockFileWriter,
        mut batch: IndexBatch,
        checkpoint: &CheckpointInfo,
    ) -> Result<(), StorageError> {
        writer.flush()?;
        batch.put_checkpoint(checkpoint)?;
        if !checkpoint.is_chain_empty {
            batch.put_index_checkpoint(checkpoint.latest_block_number)?;
        }
        self.index.commit_staged(batch, true)
    }

    /// Mark the writer unusable after `err`.
    pub(crate) fn poison(&self, failed: &mut bool, err: StorageError) -> StorageError {
        *failed = true;
        tracing::error!(error = %err, "block writer failed, ledger must be reopened");
        err
    }
}
