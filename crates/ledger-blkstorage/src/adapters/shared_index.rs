//! # Shared Index Handle
//!
//! One key-value engine serves every ledger of a provider. Each open ledger
//! holds an [`IndexDbHandle`] that confines it to its own key namespace and
//! counts as one reference on the shared database.
//!
//! The engine is closed either explicitly ([`SharedIndexDb::close`], after
//! which every handle reports `IndexUnavailable`) or once the last handle is
//! released after [`SharedIndexDb::close_when_unreferenced`] was requested.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::domain::errors::StorageError;
use crate::domain::keys::ledger_namespace;
use crate::ports::outbound::{KeyValueStore, WriteBatch};

#[derive(Debug, Default)]
struct RefState {
    refs: usize,
    close_requested: bool,
}

/// Reference-counted owner of the index engine.
pub struct SharedIndexDb {
    store: RwLock<Option<Arc<dyn KeyValueStore>>>,
    state: Mutex<RefState>,
}

impl SharedIndexDb {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Arc<Self> {
        Arc::new(Self {
            store: RwLock::new(Some(store)),
            state: Mutex::new(RefState::default()),
        })
    }

    /// Take a reference scoped to `ledger_id`'s namespace.
    pub fn handle(self: &Arc<Self>, ledger_id: &str) -> Result<IndexDbHandle, StorageError> {
        let mut state = self.state.lock();
        if state.close_requested || self.store.read().is_none() {
            return Err(StorageError::IndexUnavailable);
        }
        state.refs += 1;
        Ok(IndexDbHandle {
            db: Arc::clone(self),
            namespace: ledger_namespace(ledger_id),
            released: Mutex::new(false),
        })
    }

    /// Number of live handles.
    pub fn ref_count(&self) -> usize {
        self.state.lock().refs
    }

    pub fn is_closed(&self) -> bool {
        self.store.read().is_none()
    }

    /// Close the engine now, regardless of outstanding handles.
    pub fn close(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.close_requested = true;
        self.close_engine()
    }

    /// Close the engine once no handle references it.
    ///
    /// Returns `true` when the engine was closed by this call.
    pub fn close_when_unreferenced(&self) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        state.close_requested = true;
        if state.refs == 0 {
            self.close_engine()?;
            Ok(true)
        } else {
            tracing::debug!(refs = state.refs, "index close deferred until last handle is released");
            Ok(false)
        }
    }

    fn release(&self) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state.refs = state.refs.saturating_sub(1);
        if state.refs == 0 && state.close_requested {
            self.close_engine()?;
        }
        Ok(())
    }

    /// Caller holds `state`.
    fn close_engine(&self) -> Result<(), StorageError> {
        let store = self.store.write().take();
        if let Some(store) = store {
            store.close()?;
            tracing::info!("shared index closed");
        }
        Ok(())
    }

    fn store(&self) -> Result<Arc<dyn KeyValueStore>, StorageError> {
        self.store
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(StorageError::IndexUnavailable)
    }
}

/// One ledger's view of the shared index.
///
/// Keys passed in and returned are relative to the ledger namespace.
pub struct IndexDbHandle {
    db: Arc<SharedIndexDb>,
    namespace: Vec<u8>,
    released: Mutex<bool>,
}

impl IndexDbHandle {
    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut full = Vec::with_capacity(self.namespace.len() + key.len());
        full.extend_from_slice(&self.namespace);
        full.extend_from_slice(key);
        full
    }

    fn store(&self) -> Result<Arc<dyn KeyValueStore>, StorageError> {
        if *self.released.lock() {
            return Err(StorageError::IndexUnavailable);
        }
        self.db.store()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.store()?.get(&self.full_key(key))?)
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        Ok(self.store()?.exists(&self.full_key(key))?)
    }

    pub fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<(), StorageError> {
        Ok(self.store()?.put(&self.full_key(key), value, sync)?)
    }

    pub fn write_batch(&self, batch: WriteBatch, sync: bool) -> Result<(), StorageError> {
        let store = self.store()?;
        let batch = batch.map_keys(|key| self.full_key(&key));
        Ok(store.atomic_batch_write(batch, sync)?)
    }

    /// Entries under `prefix`, ascending, with the namespace stripped.
    pub fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let ns_len = self.namespace.len();
        let entries = self.store()?.prefix_scan(&self.full_key(prefix))?;
        Ok(entries
            .into_iter()
            .map(|(mut key, value)| {
                key.drain(..ns_len);
                (key, value)
            })
            .collect())
    }

    /// Give back this handle's reference. Later calls fail with
    /// `IndexUnavailable`; releasing twice is a no-op.
    pub fn release(&self) -> Result<(), StorageError> {
        let mut released = self.released.lock();
        if *released {
            return Ok(());
        }
        *released = true;
        self.db.release()
    }
}

impl Drop for IndexDbHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(error = %e, "failed to release index handle");
        }
    }
}
