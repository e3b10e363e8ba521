//! # RocksDB Index Engine
//!
//! RocksDB implementation of the `KeyValueStore` trait, enabled with the
//! `rocksdb` feature.
//!
//! - Atomic batch writes (`WriteBatch`)
//! - Snappy compression and bloom filters
//! - Per-call `sync` maps onto `WriteOptions::set_sync`

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use rocksdb::{BlockBasedOptions, Cache, DBCompressionType, Direction, IteratorMode, Options, WriteOptions, DB};

use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{KeyValueStore, WriteBatch};

/// RocksDB tuning for the index.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory.
    pub path: PathBuf,
    /// Block cache size in bytes (default: 64MB).
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 16MB).
    pub write_buffer_size: usize,
    /// Maximum number of write buffers (default: 3).
    pub max_write_buffer_number: i32,
}

impl RocksDbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 64 * 1024 * 1024,
            write_buffer_size: 16 * 1024 * 1024,
            max_write_buffer_number: 3,
        }
    }
}

/// RocksDB-backed key-value store.
pub struct RocksDbStore {
    db: RwLock<Option<DB>>,
    path: PathBuf,
}

impl RocksDbStore {
    /// Open or create a RocksDB database.
    pub fn open(config: RocksDbConfig) -> Result<Self, KVStoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_compression_type(DBCompressionType::Snappy);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, &config.path).map_err(|e| KVStoreError::IOError {
            message: format!("Failed to open RocksDB: {}", e),
        })?;
        tracing::info!(path = %config.path.display(), "opened RocksDB index store");

        Ok(Self {
            db: RwLock::new(Some(db)),
            path: config.path,
        })
    }

    /// Open with default tuning.
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self, KVStoreError> {
        Self::open(RocksDbConfig::new(path.as_ref()))
    }

    fn write_options(sync: bool) -> WriteOptions {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(sync);
        write_opts
    }
}

impl KeyValueStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(KVStoreError::Closed)?;
        db.get(key).map_err(|e| KVStoreError::IOError {
            message: format!("RocksDB get failed: {}", e),
        })
    }

    fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<(), KVStoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(KVStoreError::Closed)?;
        db.put_opt(key, value, &Self::write_options(sync))
            .map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB put failed: {}", e),
            })
    }

    fn atomic_batch_write(&self, batch: WriteBatch, sync: bool) -> Result<(), KVStoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(KVStoreError::Closed)?;

        let mut rocks_batch = rocksdb::WriteBatch::default();
        for (key, value) in batch {
            rocks_batch.put(&key, &value);
        }

        db.write_opt(rocks_batch, &Self::write_options(sync))
            .map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB batch write failed: {}", e),
            })
    }

    fn exists(&self, key: &[u8]) -> Result<bool, KVStoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(KVStoreError::Closed)?;
        db.get_pinned(key)
            .map(|v| v.is_some())
            .map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB exists check failed: {}", e),
            })
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let guard = self.db.read();
        let db = guard.as_ref().ok_or(KVStoreError::Closed)?;
        let mut results = Vec::new();

        for item in db.iterator(IteratorMode::From(prefix, Direction::Forward)) {
            let (key, value) = item.map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB scan failed: {}", e),
            })?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push((key.to_vec(), value.to_vec()));
        }

        Ok(results)
    }

    fn close(&self) -> Result<(), KVStoreError> {
        let mut guard = self.db.write();
        if let Some(db) = guard.take() {
            db.flush().map_err(|e| KVStoreError::IOError {
                message: format!("RocksDB flush failed: {}", e),
            })?;
            tracing::info!(path = %self.path.display(), "closed RocksDB index store");
        }
        Ok(())
    }
}
