//! # Configuration
//!
//! Options recognized by the block store provider.
//!
//! ## Directory layout
//!
//! ```text
//! <storage_root_path>/
//! ├── LOCK                      process lock held by the provider
//! ├── index/                    shared index database (all ledgers)
//! └── chains/
//!     └── <ledger_id>/
//!         ├── blockfile_000000
//!         └── blockfile_000001
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::errors::StorageError;

/// Default maximum size of one rolling block file (64 MiB).
pub const DEFAULT_MAX_BLOCK_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Environment variable overriding `storage_root_path`.
pub const ENV_STORAGE_ROOT: &str = "LEDGER_STORAGE_ROOT";
/// Environment variable overriding `max_block_file_size_bytes`.
pub const ENV_MAX_BLOCKFILE_SIZE: &str = "LEDGER_MAX_BLOCKFILE_SIZE";
/// Environment variable overriding `flush_interval_blocks`.
pub const ENV_FLUSH_INTERVAL_BLOCKS: &str = "LEDGER_FLUSH_INTERVAL_BLOCKS";
/// Environment variable overriding `index_engine`.
pub const ENV_INDEX_ENGINE: &str = "LEDGER_INDEX_ENGINE";

const CHAINS_DIR: &str = "chains";
const INDEX_DIR: &str = "index";
const LOCK_FILE: &str = "LOCK";

/// Which key-value engine backs the shared index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexEngine {
    /// Ordered map persisted to a single file under `index/`.
    #[default]
    File,
    /// Volatile ordered map; the index is rebuilt from the block files on open.
    Memory,
    /// RocksDB database under `index/`.
    #[cfg(feature = "rocksdb")]
    RocksDb,
}

impl IndexEngine {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "file" => Some(IndexEngine::File),
            "memory" => Some(IndexEngine::Memory),
            #[cfg(feature = "rocksdb")]
            "rocksdb" => Some(IndexEngine::RocksDb),
            _ => None,
        }
    }
}

/// Configuration for the block store provider.
///
/// All values have working defaults; hosts typically override the root path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockStoreConfig {
    /// Directory holding the lock file, the index and every ledger's files.
    pub storage_root_path: PathBuf,

    /// A block file is sealed once the next record would push it past this
    /// size (default: 64 MiB). A single record larger than the limit still
    /// gets a file of its own.
    pub max_block_file_size_bytes: u64,

    /// Pending no-sync blocks after which the store flushes on its own.
    ///
    /// `0` (default) leaves every flush to the caller.
    pub flush_interval_blocks: u64,

    /// Engine backing the shared index.
    pub index_engine: IndexEngine,
}

impl Default for BlockStoreConfig {
    fn default() -> Self {
        Self {
            storage_root_path: PathBuf::from("./data/ledgers"),
            max_block_file_size_bytes: DEFAULT_MAX_BLOCK_FILE_SIZE,
            flush_interval_blocks: 0,
            index_engine: IndexEngine::default(),
        }
    }
}

impl BlockStoreConfig {
    /// Default configuration rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::default().with_storage_root(root)
    }

    /// Default configuration with overrides from `LEDGER_*` environment
    /// variables.
    pub fn from_env() -> Result<Self, StorageError> {
        Self::default().apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up by variable name.
    pub(crate) fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, StorageError> {
        if let Some(root) = lookup(ENV_STORAGE_ROOT) {
            self.storage_root_path = PathBuf::from(root);
        }
        if let Some(value) = lookup(ENV_MAX_BLOCKFILE_SIZE) {
            self.max_block_file_size_bytes = parse_u64(ENV_MAX_BLOCKFILE_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_FLUSH_INTERVAL_BLOCKS) {
            self.flush_interval_blocks = parse_u64(ENV_FLUSH_INTERVAL_BLOCKS, &value)?;
        }
        if let Some(value) = lookup(ENV_INDEX_ENGINE) {
            self.index_engine =
                IndexEngine::parse(value.trim()).ok_or(StorageError::InvalidConfig {
                    key: ENV_INDEX_ENGINE,
                    value,
                })?;
        }
        Ok(self)
    }

    /// Set the storage root directory.
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root_path = root.into();
        self
    }

    /// Set the rolling file size limit.
    pub fn with_max_block_file_size(mut self, bytes: u64) -> Self {
        self.max_block_file_size_bytes = bytes;
        self
    }

    /// Set the automatic flush interval for no-sync writes.
    pub fn with_flush_interval(mut self, blocks: u64) -> Self {
        self.flush_interval_blocks = blocks;
        self
    }

    /// Set the index engine.
    pub fn with_index_engine(mut self, engine: IndexEngine) -> Self {
        self.index_engine = engine;
        self
    }

    pub fn chains_dir(&self) -> PathBuf {
        self.storage_root_path.join(CHAINS_DIR)
    }

    /// Directory holding one ledger's block files.
    pub fn ledger_dir(&self, ledger_id: &str) -> PathBuf {
        self.chains_dir().join(ledger_id)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.storage_root_path.join(INDEX_DIR)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.storage_root_path.join(LOCK_FILE)
    }

    pub fn root(&self) -> &Path {
        &self.storage_root_path
    }
}

fn parse_u64(key: &'static str, value: &str) -> Result<u64, StorageError> {
    value
        .trim()
        .parse()
        .map_err(|_| StorageError::InvalidConfig {
            key,
            value: value.to_string(),
        })
}
