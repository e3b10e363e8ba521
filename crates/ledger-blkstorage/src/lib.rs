//! # Ledger Block Storage
//!
//! Append-only storage of ledger blocks with a crash-recoverable secondary
//! index. Blocks can be looked up by number, by hash and by transaction id.
//!
//! ## Layout on disk
//!
//! Each ledger writes its blocks into size-bounded rolling files. One index
//! database is shared by every ledger of a [`BlockStoreProvider`] and holds,
//! per ledger, the block and transaction entries plus two checkpoints: the
//! last durable file position and the last indexed block.
//!
//! ## Durability
//!
//! | Operation | Returns after |
//! |-----------|---------------|
//! | `add_block` | block bytes synced, index entries and checkpoint committed |
//! | `add_block_no_sync` | block bytes written; readable, not yet durable |
//! | `flush` | every earlier block synced and committed |
//!
//! Index entries are never committed for block bytes that are not synced.
//! On open, blocks found in the files beyond the checkpoint are re-validated
//! and re-indexed; an incomplete tail record is cut off.
//!
//! ## Crate Structure (Hexagonal Architecture)
//!
//! - `domain/` - codec, entities, errors, configuration, key layout
//! - `blockfile/` - rolling block files: writer, reader, recovery scan
//! - `index/` - the per-ledger block index over the shared database
//! - `ports/` - `BlockStoreApi` (inbound), `KeyValueStore` (outbound)
//! - `adapters/` - index engines, shared index handle, storage root lock
//! - `service/` - the `BlockStore` façade
//! - `provider` - opening and closing ledgers under one root
//!
//! ## Usage
//!
//! ```ignore
//! use ledger_blkstorage::{BlockStoreApi, BlockStoreConfig, BlockStoreProvider};
//!
//! let provider = BlockStoreProvider::new(BlockStoreConfig::new("/var/ledgers"))?;
//! let store = provider.open("mychannel")?;
//! store.add_block(&block)?;
//! let tx = store.retrieve_tx_by_id("tx-1")?;
//! provider.close()?;
//! ```

pub mod adapters;
pub mod blockfile;
pub mod domain;
pub mod index;
pub mod ports;
pub mod provider;
pub mod service;

pub use adapters::storage::{FileBackedKVStore, InMemoryKVStore};
#[cfg(feature = "rocksdb")]
pub use adapters::storage::{RocksDbConfig, RocksDbStore};
pub use adapters::{DatabaseLock, IndexDbHandle, SharedIndexDb};
pub use domain::codec::{deserialize_block, extract_block_info, serialize_block};
pub use domain::config::{BlockStoreConfig, IndexEngine};
pub use domain::entities::{
    BlockchainInfo, CheckpointInfo, Location, SerializedBlockInfo, TxIndexValue, TxOffset, TxRange,
};
pub use domain::errors::{CodecError, KVStoreError, LockError, StorageError};
pub use domain::keys::{ledger_key, KeyPrefix};
pub use ports::inbound::{BlockStoreApi, MAX_BLOCKS_PER_RANGE};
pub use ports::outbound::{KeyValueStore, WriteBatch};
pub use provider::{validate_ledger_id, BlockStoreProvider, MAX_LEDGER_ID_LEN};
pub use service::BlockStore;
