//! # Outbound Ports (Driven Ports)
//!
//! The ordered key-value engine the index is built on.
//!
//! Any engine offering point lookups, ordered prefix scans and atomic batches
//! satisfies the contract:
//!
//! - `InMemoryKVStore` (adapters/storage/memory.rs)
//! - `FileBackedKVStore` (adapters/storage/file.rs)
//! - `RocksDbStore` (adapters/storage/rocksdb.rs, `rocksdb` feature)

use crate::domain::errors::KVStoreError;

/// Abstract interface for key-value database operations.
///
/// Methods take `&self`; engines synchronize internally so one instance can be
/// shared by every ledger of a provider.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError>;

    /// Put a single key-value pair.
    ///
    /// With `sync` set the write is durable when the call returns.
    fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<(), KVStoreError>;

    /// Execute an atomic batch write.
    ///
    /// Either every entry of the batch is applied, or none is.
    fn atomic_batch_write(&self, batch: WriteBatch, sync: bool) -> Result<(), KVStoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError>;

    /// Persist outstanding writes and release the engine.
    ///
    /// Every later call fails with `KVStoreError::Closed`. Closing twice is a
    /// no-op.
    fn close(&self) -> Result<(), KVStoreError>;
}

/// Puts applied together by [`KeyValueStore::atomic_batch_write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Move every entry of `other` into this batch, keeping their order.
    pub fn append(&mut self, other: &mut WriteBatch) {
        self.entries.append(&mut other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Vec<u8>, Vec<u8>)> {
        self.entries.iter()
    }

    /// Rewrite every key, e.g. to add a namespace.
    pub fn map_keys(self, mut f: impl FnMut(Vec<u8>) -> Vec<u8>) -> WriteBatch {
        WriteBatch {
            entries: self
                .entries
                .into_iter()
                .map(|(k, v)| (f(k), v))
                .collect(),
        }
    }
}

impl IntoIterator for WriteBatch {
    type Item = (Vec<u8>, Vec<u8>);
    type IntoIter = std::vec::IntoIter<(Vec<u8>, Vec<u8>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
