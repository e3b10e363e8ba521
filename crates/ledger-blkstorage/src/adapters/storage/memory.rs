use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{KeyValueStore, WriteBatch};

/// In-memory key-value store.
///
/// Used by tests and by ledgers configured with the memory index engine. The
/// `sync` flag is accepted and ignored.
pub struct InMemoryKVStore {
    data: RwLock<Option<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryKVStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Some(BTreeMap::new())),
        }
    }

    /// Number of live entries (0 once closed).
    pub fn len(&self) -> usize {
        self.data.read().as_ref().map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryKVStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        let data = self.data.read();
        let data = data.as_ref().ok_or(KVStoreError::Closed)?;
        Ok(data.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8], _sync: bool) -> Result<(), KVStoreError> {
        let mut data = self.data.write();
        let data = data.as_mut().ok_or(KVStoreError::Closed)?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn atomic_batch_write(&self, batch: WriteBatch, _sync: bool) -> Result<(), KVStoreError> {
        // A single write lock makes the batch atomic for readers.
        let mut data = self.data.write();
        let data = data.as_mut().ok_or(KVStoreError::Closed)?;
        data.extend(batch);
        Ok(())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let data = self.data.read();
        let data = data.as_ref().ok_or(KVStoreError::Closed)?;
        Ok(scan(data, prefix))
    }

    fn close(&self) -> Result<(), KVStoreError> {
        self.data.write().take();
        Ok(())
    }
}

/// Ordered prefix scan over a `BTreeMap`.
pub(super) fn scan(data: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    data.range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
