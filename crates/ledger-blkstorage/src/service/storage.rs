//! # Block Store API Implementation

use std::sync::atomic::Ordering;

use ledger_types::{Block, TxValidationCode};

use super::BlockStore;
use crate::blockfile::{read_range, SyncMode};
use crate::domain::codec::serialize_block;
use crate::domain::entities::{BlockchainInfo, CheckpointInfo};
use crate::domain::errors::StorageError;
use crate::index::{IndexBatch, TxIndexEntry};
use crate::ports::inbound::{BlockStoreApi, MAX_BLOCKS_PER_RANGE};

impl BlockStore {
    fn append(&self, block: &Block, mode: SyncMode) -> Result<(), StorageError> {
        self.ensure_open()?;
        let mut state = self.writer.lock();
        let state = &mut *state;
        if state.failed {
            return Err(StorageError::WriterFailed {
                ledger_id: self.ledger_id.clone(),
            });
        }
        let writer = state.writer.as_mut().ok_or_else(|| StorageError::StoreClosed {
            ledger_id: self.ledger_id.clone(),
        })?;

        let number = block.number();
        let expected = state.checkpoint.next_block_number();
        if number != expected {
            return Err(StorageError::UnexpectedBlockNumber {
                expected,
                got: number,
            });
        }
        if !state.checkpoint.is_chain_empty
            && block.header.previous_hash != state.checkpoint.latest_block_hash
        {
            return Err(StorageError::PreviousHashMismatch {
                number,
                expected: state.checkpoint.latest_block_hash.clone(),
                actual: block.header.previous_hash.clone(),
            });
        }

        let (bytes, info) = serialize_block(block);
        let location = writer
            .append(&bytes, SyncMode::NoSync)
            .map_err(|e| self.poison(&mut state.failed, e))?;
        let mut batch = IndexBatch::new();
        batch
            .put_block(&info, &location)
            .map_err(|e| self.poison(&mut state.failed, e))?;

        let hash = info.block_header.hash();
        let checkpoint = CheckpointInfo {
            latest_file_id: writer.file_id(),
            latest_file_size: writer.size(),
            latest_block_number: number,
            latest_block_hash: hash.clone(),
            is_chain_empty: false,
        };

        let interval_reached =
            self.flush_interval > 0 && state.pending_blocks + 1 >= self.flush_interval;
        if mode == SyncMode::Sync || interval_reached {
            self.commit_locked(writer, batch, &checkpoint)
                .map_err(|e| self.poison(&mut state.failed, e))?;
            state.pending_blocks = 0;
        } else {
            self.index.stage(batch);
            state.pending_blocks += 1;
        }
        state.checkpoint = checkpoint;

        let mut chain = self.info.write();
        chain.height = number + 1;
        chain.previous_block_hash = std::mem::replace(&mut chain.current_block_hash, hash);
        drop(chain);

        tracing::debug!(
            block = number,
            file = location.file_id,
            offset = location.offset,
            length = location.length,
            txs = info.tx_offsets.len(),
            synced = state.pending_blocks == 0,
            "added block"
        );
        Ok(())
    }

    fn first_tx(&self, tx_id: &str) -> Result<TxIndexEntry, StorageError> {
        self.ensure_open()?;
        self.index
            .get_location_by_tx_id(tx_id)?
            .ok_or_else(|| StorageError::TxNotFound {
                tx_id: tx_id.to_string(),
            })
    }
}

impl BlockStoreApi for BlockStore {
    fn add_block(&self, block: &Block) -> Result<(), StorageError> {
        let _guard = self.span.enter();
        self.append(block, SyncMode::Sync)
    }

    fn add_block_no_sync(&self, block: &Block) -> Result<(), StorageError> {
        let _guard = self.span.enter();
        self.append(block, SyncMode::NoSync)
    }

    fn flush(&self) -> Result<(), StorageError> {
        let _guard = self.span.enter();
        self.ensure_open()?;
        let mut state = self.writer.lock();
        let state = &mut *state;
        if state.failed {
            return Err(StorageError::WriterFailed {
                ledger_id: self.ledger_id.clone(),
            });
        }
        let writer = state.writer.as_mut().ok_or_else(|| StorageError::StoreClosed {
            ledger_id: self.ledger_id.clone(),
        })?;
        if state.pending_blocks == 0 {
            return Ok(());
        }

        let pending = state.pending_blocks;
        self.commit_locked(writer, IndexBatch::new(), &state.checkpoint)
            .map_err(|e| self.poison(&mut state.failed, e))?;
        state.pending_blocks = 0;
        tracing::debug!(blocks = pending, "flushed pending blocks");
        Ok(())
    }

    fn get_blockchain_info(&self) -> Result<BlockchainInfo, StorageError> {
        let _guard = self.span.enter();
        self.ensure_open()?;
        Ok(self.info.read().clone())
    }

    fn retrieve_block_by_number(&self, number: u64) -> Result<Block, StorageError> {
        let _guard = self.span.enter();
        self.ensure_open()?;
        self.block_by_number(number)
    }

    fn retrieve_block_by_hash(&self, hash: &[u8]) -> Result<Block, StorageError> {
        let _guard = self.span.enter();
        self.ensure_open()?;
        let number = self
            .index
            .get_number_by_hash(hash)?
            .ok_or_else(|| StorageError::BlockHashNotFound {
                hash: hash.to_vec(),
            })?;
        self.block_by_number(number)
    }

    fn retrieve_blocks(&self, start: u64, limit: usize) -> Result<Vec<Block>, StorageError> {
        let _guard = self.span.enter();
        self.ensure_open()?;
        let height = self.info.read().height;
        if start >= height {
            return Err(StorageError::BlockNumberNotFound { number: start });
        }
        let count = limit.min(MAX_BLOCKS_PER_RANGE) as u64;
        let end = start.saturating_add(count).min(height);
        (start..end).map(|n| self.block_by_number(n)).collect()
    }

    fn retrieve_tx_by_id(&self, tx_id: &str) -> Result<Vec<u8>, StorageError> {
        let _guard = self.span.enter();
        let entry = self.first_tx(tx_id)?;
        read_range(&self.dir, &entry.value.location)
    }

    fn retrieve_tx_by_block_num_tx_num(
        &self,
        block_num: u64,
        tx_num: u64,
    ) -> Result<Vec<u8>, StorageError> {
        let _guard = self.span.enter();
        self.ensure_open()?;
        let block = self.block_by_number(block_num)?;
        usize::try_from(tx_num)
            .ok()
            .and_then(|i| block.data.data.get(i).cloned())
            .ok_or(StorageError::TxNumberNotFound { block_num, tx_num })
    }

    fn retrieve_block_by_tx_id(&self, tx_id: &str) -> Result<Block, StorageError> {
        let _guard = self.span.enter();
        let entry = self.first_tx(tx_id)?;
        self.block_by_number(entry.block_num)
    }

    fn retrieve_tx_validation_code_by_tx_id(
        &self,
        tx_id: &str,
    ) -> Result<TxValidationCode, StorageError> {
        let _guard = self.span.enter();
        let entry = self.first_tx(tx_id)?;
        Ok(TxValidationCode(entry.value.validation_code))
    }

    fn tx_id_exists(&self, tx_id: &str) -> Result<bool, StorageError> {
        let _guard = self.span.enter();
        self.ensure_open()?;
        self.index.tx_id_exists(tx_id)
    }

    fn shutdown(&self) -> Result<(), StorageError> {
        let _guard = self.span.enter();
        let mut state = self.writer.lock();
        let state = &mut *state;
        let Some(mut writer) = state.writer.take() else {
            return Ok(());
        };

        let flushed = if state.failed || state.pending_blocks == 0 {
            Ok(())
        } else {
            self.commit_locked(&mut writer, IndexBatch::new(), &state.checkpoint)
        };
        if flushed.is_ok() {
            state.pending_blocks = 0;
        } else {
            self.index.discard_staged();
        }
        drop(writer);

        self.closed.store(true, Ordering::Release);
        let released = self.index.release();
        tracing::info!(height = self.info.read().height, "block store shut down");
        flushed.and(released)
    }
}
