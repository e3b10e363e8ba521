//! # Block Store Provider
//!
//! Owns the storage root: the process lock, the shared index and every open
//! ledger's [`BlockStore`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::adapters::storage::{FileBackedKVStore, InMemoryKVStore};
#[cfg(feature = "rocksdb")]
use crate::adapters::storage::RocksDbStore;
use crate::adapters::{DatabaseLock, SharedIndexDb};
use crate::domain::config::{BlockStoreConfig, IndexEngine};
use crate::domain::errors::StorageError;
use crate::ports::inbound::BlockStoreApi;
use crate::ports::outbound::KeyValueStore;
use crate::service::BlockStore;

/// Longest accepted ledger id.
pub const MAX_LEDGER_ID_LEN: usize = 249;

const INDEX_FILE: &str = "index.db";

/// Check that `ledger_id` can name a ledger directory.
///
/// Ids start with a lowercase ASCII letter and continue with lowercase
/// letters, digits, `.` or `-`.
pub fn validate_ledger_id(ledger_id: &str) -> Result<(), StorageError> {
    let invalid = |reason| StorageError::InvalidLedgerId {
        ledger_id: ledger_id.to_string(),
        reason,
    };

    let mut chars = ledger_id.chars();
    match chars.next() {
        None => return Err(invalid("empty")),
        Some(c) if !c.is_ascii_lowercase() => {
            return Err(invalid("must start with a lowercase letter"))
        }
        Some(_) => {}
    }
    if ledger_id.len() > MAX_LEDGER_ID_LEN {
        return Err(invalid("longer than 249 characters"));
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-') {
        return Err(invalid(
            "only lowercase letters, digits, '.' and '-' are allowed",
        ));
    }
    Ok(())
}

fn open_engine(config: &BlockStoreConfig) -> Result<Arc<dyn KeyValueStore>, StorageError> {
    let engine: Arc<dyn KeyValueStore> = match config.index_engine {
        IndexEngine::File => Arc::new(FileBackedKVStore::open(
            config.index_dir().join(INDEX_FILE),
        )?),
        IndexEngine::Memory => Arc::new(InMemoryKVStore::new()),
        #[cfg(feature = "rocksdb")]
        IndexEngine::RocksDb => Arc::new(RocksDbStore::open_default(config.index_dir())?),
    };
    Ok(engine)
}

/// Entry point for opening ledgers under one storage root.
///
/// At most one provider may hold a root at a time, across processes.
pub struct BlockStoreProvider {
    config: BlockStoreConfig,
    index_db: Arc<SharedIndexDb>,
    stores: Mutex<HashMap<String, Arc<BlockStore>>>,
    closed: AtomicBool,
    span: tracing::Span,
    _lock: DatabaseLock,
}

impl BlockStoreProvider {
    /// Open the storage root described by `config`, recording events under
    /// the current span.
    pub fn new(config: BlockStoreConfig) -> Result<Self, StorageError> {
        Self::with_span(config, tracing::Span::current())
    }

    /// Like [`new`](Self::new), with `span` as the parent of every ledger's
    /// span.
    pub fn with_span(config: BlockStoreConfig, span: tracing::Span) -> Result<Self, StorageError> {
        let guard = span.enter();
        let root = config.root().to_path_buf();
        std::fs::create_dir_all(&root).map_err(StorageError::io(&root))?;

        let lock = DatabaseLock::acquire(&config.lock_path())?;
        let index_db = SharedIndexDb::new(open_engine(&config)?);
        tracing::info!(
            root = %root.display(),
            engine = ?config.index_engine,
            max_block_file_size = config.max_block_file_size_bytes,
            "block store provider opened"
        );
        drop(guard);

        Ok(Self {
            config,
            index_db,
            stores: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            span,
            _lock: lock,
        })
    }

    pub fn config(&self) -> &BlockStoreConfig {
        &self.config
    }

    /// The shared index all ledgers of this provider write to.
    pub fn index_db(&self) -> &Arc<SharedIndexDb> {
        &self.index_db
    }

    /// Open `ledger_id`, creating it if needed.
    ///
    /// Returns the already open store when there is one. A store that was
    /// shut down individually is reopened.
    pub fn open(&self, ledger_id: &str) -> Result<Arc<BlockStore>, StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::ProviderClosed);
        }
        validate_ledger_id(ledger_id)?;

        let mut stores = self.stores.lock();
        if let Some(store) = stores.get(ledger_id) {
            if !store.is_closed() {
                return Ok(Arc::clone(store));
            }
        }

        let handle = self.index_db.handle(ledger_id)?;
        let store = Arc::new(BlockStore::open(ledger_id, &self.config, handle, &self.span)?);
        stores.insert(ledger_id.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Whether `ledger_id` has a directory under the storage root.
    pub fn exists(&self, ledger_id: &str) -> Result<bool, StorageError> {
        validate_ledger_id(ledger_id)?;
        Ok(self.config.ledger_dir(ledger_id).is_dir())
    }

    /// Ids of every ledger found under the storage root, sorted.
    pub fn list(&self) -> Result<Vec<String>, StorageError> {
        let chains = self.config.chains_dir();
        let entries = match std::fs::read_dir(&chains) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&chains)(e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(StorageError::io(&chains))?;
            let is_dir = entry
                .file_type()
                .map_err(StorageError::io(entry.path()))?
                .is_dir();
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                if validate_ledger_id(name).is_ok() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Shut down every open ledger and close the shared index.
    ///
    /// All ledgers are shut down even if some fail; the first error is
    /// returned. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), StorageError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _guard = self.span.enter();

        let stores: Vec<_> = self.stores.lock().drain().collect();
        let mut first_err = None;
        for (ledger_id, store) in stores {
            if let Err(e) = store.shutdown() {
                tracing::warn!(ledger = %ledger_id, error = %e, "failed to shut down block store");
                first_err.get_or_insert(e);
            }
        }

        let closed = self.index_db.close_when_unreferenced()?;
        tracing::info!(index_closed = closed, "block store provider closed");
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for BlockStoreProvider {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close block store provider");
        }
    }
}
