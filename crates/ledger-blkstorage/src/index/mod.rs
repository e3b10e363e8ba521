//! # Block Index
//!
//! Secondary index of one ledger: block number → location, block hash →
//! number, transaction id → location, plus the two checkpoints.
//!
//! Writes go through an [`IndexBatch`]. A batch is either committed straight
//! to the engine or *staged*: staged entries are visible to every lookup at
//! once but reach the engine only with the next [`BlockIndex::commit_staged`],
//! which the store issues after the block files are synced. The engine
//! therefore never holds an entry for bytes that are not yet durable.
//!
//! Values are bincode-encoded. A value that fails to decode is reported with
//! its key and raw bytes.

use std::collections::BTreeMap;

use bincode::Options;
use ledger_types::TxValidationCode;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::adapters::shared_index::IndexDbHandle;
use crate::domain::entities::{CheckpointInfo, Location, SerializedBlockInfo, TxIndexValue};
use crate::domain::errors::StorageError;
use crate::domain::keys::{parse_tx_key, KeyPrefix};
use crate::ports::outbound::WriteBatch;


fn codec() -> impl Options {
    bincode::DefaultOptions::new()
}

fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    codec()
        .serialize(value)
        .map_err(|e| StorageError::Serialization {
            message: e.to_string(),
        })
}

fn decode_value<T: DeserializeOwned>(key: &[u8], value: &[u8]) -> Result<T, StorageError> {
    codec()
        .deserialize(value)
        .map_err(|e| StorageError::CorruptIndexValue {
            key: key.to_vec(),
            value: value.to_vec(),
            message: e.to_string(),
        })
}

/// A transaction index hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxIndexEntry {
    pub block_num: u64,
    pub tx_num: u64,
    pub value: TxIndexValue,
}

/// Index entries written together.
#[derive(Debug, Default)]
pub struct IndexBatch {
    batch: WriteBatch,
}

impl IndexBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_block_index(
        &mut self,
        number: u64,
        hash: &[u8],
        location: &Location,
    ) -> Result<(), StorageError> {
        self.batch
            .put(KeyPrefix::block_number_key(number), encode_value(location)?);
        self.batch
            .put(KeyPrefix::block_hash_key(hash), encode_value(&number)?);
        Ok(())
    }

    pub fn put_tx_index(
        &mut self,
        tx_id: &str,
        block_num: u64,
        tx_num: u64,
        location: &Location,
        validation_code: u8,
    ) -> Result<(), StorageError> {
        let value = TxIndexValue {
            location: *location,
            validation_code,
        };
        self.batch.put(
            KeyPrefix::tx_key(tx_id, block_num, tx_num),
            encode_value(&value)?,
        );
        Ok(())
    }

    /// Every entry of one block stored at `block_location`.
    ///
    /// Transactions without an id get no tx entry; they stay reachable by
    /// block number and position.
    pub fn put_block(
        &mut self,
        info: &SerializedBlockInfo,
        block_location: &Location,
    ) -> Result<(), StorageError> {
        let number = info.block_number();
        self.put_block_index(number, &info.block_header.hash(), block_location)?;
        for (tx_num, tx) in info.tx_offsets.iter().enumerate() {
            if tx.tx_id.is_empty() {
                continue;
            }
            let code = info
                .metadata
                .tx_validation_code(tx_num)
                .unwrap_or(TxValidationCode::NOT_VALIDATED);
            self.put_tx_index(
                &tx.tx_id,
                number,
                tx_num as u64,
                &block_location.slice(&tx.range),
                code.0,
            )?;
        }
        Ok(())
    }

    pub fn put_checkpoint(&mut self, checkpoint: &CheckpointInfo) -> Result<(), StorageError> {
        self.batch
            .put(KeyPrefix::checkpoint_key(), encode_value(checkpoint)?);
        Ok(())
    }

    /// Record that every block up to `number` is indexed.
    pub fn put_index_checkpoint(&mut self, number: u64) -> Result<(), StorageError> {
        self.batch
            .put(KeyPrefix::index_checkpoint_key(), encode_value(&number)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// One ledger's index over the shared database.
pub struct BlockIndex {
    handle: IndexDbHandle,
    staged: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl BlockIndex {
    pub fn new(handle: IndexDbHandle) -> Self {
        Self {
            handle,
            staged: RwLock::new(BTreeMap::new()),
        }
    }

    /// Write `batch` to the engine now.
    pub fn commit(&self, batch: IndexBatch, sync: bool) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.handle.write_batch(batch.batch, sync)
    }

    /// Make `batch` visible to lookups without writing it to the engine.
    pub fn stage(&self, batch: IndexBatch) {
        self.staged.write().extend(batch.batch);
    }

    pub fn has_staged(&self) -> bool {
        !self.staged.read().is_empty()
    }

    /// Write every staged entry plus `extra` to the engine in one atomic batch.
    ///
    /// Staged entries stay visible until the write succeeds.
    pub fn commit_staged(&self, extra: IndexBatch, sync: bool) -> Result<(), StorageError> {
        let mut batch = WriteBatch::new();
        for (key, value) in self.staged.read().iter() {
            batch.put(key.clone(), value.clone());
        }
        let mut extra = extra.batch;
        batch.append(&mut extra);
        if batch.is_empty() {
            return Ok(());
        }
        self.handle.write_batch(batch, sync)?;
        self.staged.write().clear();
        Ok(())
    }

    /// Drop staged entries, e.g. after the writer failed.
    pub fn discard_staged(&self) {
        self.staged.write().clear();
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(value) = self.staged.read().get(key) {
            return Ok(Some(value.clone()));
        }
        self.handle.get(key)
    }

    fn get_decoded<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StorageError> {
        match self.get(key)? {
            Some(value) => decode_value(key, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Committed and staged entries under `prefix`, ascending.
    ///
    /// The overlay is copied before the engine is scanned: `commit_staged`
    /// writes the engine before clearing the overlay, so an entry leaving the
    /// snapshot is already in the engine.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let staged: Vec<(Vec<u8>, Vec<u8>)> = self
            .staged
            .read()
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.handle.prefix_scan(prefix)?.into_iter().collect();
        merged.extend(staged);
        Ok(merged.into_iter().collect())
    }

    pub fn get_location_by_number(&self, number: u64) -> Result<Option<Location>, StorageError> {
        self.get_decoded(&KeyPrefix::block_number_key(number))
    }

    pub fn get_number_by_hash(&self, hash: &[u8]) -> Result<Option<u64>, StorageError> {
        self.get_decoded(&KeyPrefix::block_hash_key(hash))
    }

    /// First occurrence of `tx_id` by ascending (block number, tx number).
    pub fn get_location_by_tx_id(&self, tx_id: &str) -> Result<Option<TxIndexEntry>, StorageError> {
        let entries = self.prefix_scan(&KeyPrefix::tx_id_prefix(tx_id))?;
        let Some((key, value)) = entries.into_iter().next() else {
            return Ok(None);
        };
        let (_, block_num, tx_num) =
            parse_tx_key(&key).ok_or_else(|| StorageError::CorruptIndexValue {
                key: key.clone(),
                value: value.clone(),
                message: "malformed transaction key".to_string(),
            })?;
        let value = decode_value(&key, &value)?;
        Ok(Some(TxIndexEntry {
            block_num,
            tx_num,
            value,
        }))
    }

    pub fn tx_id_exists(&self, tx_id: &str) -> Result<bool, StorageError> {
        Ok(!self
            .prefix_scan(&KeyPrefix::tx_id_prefix(tx_id))?
            .is_empty())
    }

    /// The durable file checkpoint, ignoring anything staged.
    pub fn get_checkpoint(&self) -> Result<Option<CheckpointInfo>, StorageError> {
        let key = KeyPrefix::checkpoint_key();
        match self.handle.get(&key)? {
            Some(value) => decode_value(&key, &value).map(Some),
            None => Ok(None),
        }
    }

    pub fn put_checkpoint(&self, checkpoint: &CheckpointInfo, sync: bool) -> Result<(), StorageError> {
        let mut batch = IndexBatch::new();
        batch.put_checkpoint(checkpoint)?;
        self.commit(batch, sync)
    }

    /// Last block number whose entries are committed to the engine.
    pub fn get_index_checkpoint(&self) -> Result<Option<u64>, StorageError> {
        let key = KeyPrefix::index_checkpoint_key();
        match self.handle.get(&key)? {
            Some(value) => decode_value(&key, &value).map(Some),
            None => Ok(None),
        }
    }

    /// Give back the shared index reference.
    pub fn release(&self) -> Result<(), StorageError> {
        self.handle.release()
    }
}
