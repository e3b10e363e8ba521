//! # Block Store Service
//!
//! The per-ledger façade over the rolling block files and the shared index.
//!
//! ## Lifecycle
//!
//! `BlockStore::open` recovers the ledger (see `recovery`), after which the
//! store accepts writes until `shutdown`. Every later call fails with
//! `StoreClosed`.
//!
//! ## Write path
//!
//! Appends hold the writer lock across "serialize → append → index →
//! checkpoint". A sync append syncs the file and then commits the block's
//! index entries together with the checkpoint in one batch. A no-sync append
//! stages its entries in the index overlay, which readers see immediately;
//! they are committed by the next flush. An I/O or index failure after bytes
//! reached the file poisons the writer until the ledger is reopened.
//!
//! ## Read path
//!
//! Reads never take the writer lock. The index entry of a block appears only
//! after its record is fully written, so a read never sees a torn block.

mod helpers;
mod recovery;
mod storage;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::blockfile::BlockFileWriter;
use crate::domain::entities::{BlockchainInfo, CheckpointInfo};
use crate::domain::errors::StorageError;
use crate::index::BlockIndex;

/// Writer-side state, guarded by the store's write lock.
pub(crate) struct WriterState {
    /// `None` once the store is shut down.
    pub(crate) writer: Option<BlockFileWriter>,
    /// Position after the last appended block, flushed or not.
    pub(crate) checkpoint: CheckpointInfo,
    /// No-sync blocks appended since the last flush.
    pub(crate) pending_blocks: u64,
    /// Set when a write failed after touching the block file.
    pub(crate) failed: bool,
}

/// One ledger's block store.
pub struct BlockStore {
    pub(crate) ledger_id: String,
    pub(crate) dir: PathBuf,
    pub(crate) index: BlockIndex,
    pub(crate) writer: Mutex<WriterState>,
    pub(crate) info: RwLock<BlockchainInfo>,
    pub(crate) closed: AtomicBool,
    pub(crate) flush_interval: u64,
    pub(crate) span: tracing::Span,
}

impl BlockStore {
    pub fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    /// Directory holding this ledger's block files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), StorageError> {
        if self.is_closed() {
            return Err(StorageError::StoreClosed {
                ledger_id: self.ledger_id.clone(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for BlockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockStore")
            .field("ledger_id", &self.ledger_id)
            .field("dir", &self.dir)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
