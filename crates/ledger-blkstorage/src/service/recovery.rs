//! # Opening and Recovery
//!
//! Opening a ledger reconciles three things that a crash can leave out of
//! step: the block files, the file checkpoint and the index.
//!
//! 1. Start from the stored checkpoint, or from the first block file when the
//!    index has none.
//! 2. Scan forward from the checkpoint, across rolled-over files, validating
//!    the sequence of every complete record found. A torn tail is cut off.
//!    Files that gained blocks are synced before the checkpoint moves.
//! 3. Re-index every block the index checkpoint does not cover yet.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use parking_lot::{Mutex, RwLock};

use super::{BlockStore, WriterState};
use crate::adapters::shared_index::IndexDbHandle;
use crate::blockfile::{
    block_file_path, file_len, read_block_bytes, scan_file, BlockFileStream, BlockFileWriter,
    CHECKSUM_LEN,
};
use crate::domain::codec::{deserialize_block, extract_block_info};
use crate::domain::config::BlockStoreConfig;
use crate::domain::entities::{BlockchainInfo, CheckpointInfo};
use crate::domain::errors::StorageError;
use crate::index::{BlockIndex, IndexBatch};

/// Blocks committed per index batch while re-indexing.
const REINDEX_BATCH_BLOCKS: u64 = 256;

impl BlockStore {
    /// Open the ledger `ledger_id` under `config`, recovering files and index.
    ///
    /// Events are recorded under a `blkstorage` span, child of `parent`,
    /// carrying the ledger id.
    pub fn open(
        ledger_id: &str,
        config: &BlockStoreConfig,
        handle: IndexDbHandle,
        parent: &tracing::Span,
    ) -> Result<Self, StorageError> {
        let span = tracing::info_span!(parent: parent, "blkstorage", ledger = %ledger_id);
        let _guard = span.enter();

        let dir = config.ledger_dir(ledger_id);
        std::fs::create_dir_all(&dir).map_err(StorageError::io(&dir))?;
        let index = BlockIndex::new(handle);

        let stored = index.get_checkpoint()?;
        let start = stored.clone().unwrap_or_default();
        if stored.is_none() {
            tracing::info!(dir = %dir.display(), "no checkpoint found, scanning block files from the start");
        }

        let Recovered {
            checkpoint,
            extended_files,
        } = recover_files(ledger_id, &dir, start)?;
        // blocks found past the checkpoint may still sit in the page cache
        for file_id in &extended_files {
            sync_file(&block_file_path(&dir, *file_id))?;
        }
        if stored.as_ref() != Some(&checkpoint) {
            index.put_checkpoint(&checkpoint, true)?;
        }
        sync_index(ledger_id, &dir, &index, &checkpoint)?;

        let writer = BlockFileWriter::open(
            &dir,
            checkpoint.latest_file_id,
            checkpoint.latest_file_size,
            config.max_block_file_size_bytes,
        )?;
        let info = blockchain_info(&dir, &index, &checkpoint)?;

        tracing::info!(
            height = info.height,
            file = checkpoint.latest_file_id,
            offset = checkpoint.latest_file_size,
            "opened block store"
        );

        drop(_guard);
        Ok(Self {
            ledger_id: ledger_id.to_string(),
            dir,
            index,
            writer: Mutex::new(WriterState {
                writer: Some(writer),
                checkpoint,
                pending_blocks: 0,
                failed: false,
            }),
            info: RwLock::new(info),
            closed: AtomicBool::new(false),
            flush_interval: config.flush_interval_blocks,
            span,
        })
    }
}

fn recovery_failed(ledger_id: &str, message: impl Into<String>) -> StorageError {
    StorageError::RecoveryFailed {
        ledger_id: ledger_id.to_string(),
        message: message.into(),
    }
}

/// Outcome of scanning the block files past a checkpoint.
#[derive(Debug)]
pub(super) struct Recovered {
    /// Position after the last complete block.
    pub(super) checkpoint: CheckpointInfo,
    /// Files holding complete blocks the checkpoint did not cover.
    pub(super) extended_files: Vec<u32>,
}

/// Scan past `checkpoint` for complete blocks it does not cover yet.
pub(super) fn recover_files(
    ledger_id: &str,
    dir: &Path,
    checkpoint: CheckpointInfo,
) -> Result<Recovered, StorageError> {
    let mut checkpoint = checkpoint;
    let mut file_id = checkpoint.latest_file_id;
    let mut offset = checkpoint.latest_file_size;
    let mut extended_files = Vec::new();

    loop {
        let path = block_file_path(dir, file_id);
        match file_len(&path)? {
            None if checkpoint.is_chain_empty && offset == 0 => break,
            None => {
                return Err(recovery_failed(
                    ledger_id,
                    format!("block file {} is missing", path.display()),
                ))
            }
            Some(len) if len < offset => {
                return Err(recovery_failed(
                    ledger_id,
                    format!(
                        "block file {} holds {len} bytes but the checkpoint records {offset}",
                        path.display()
                    ),
                ))
            }
            Some(_) => {}
        }

        let outcome = scan_file(dir, file_id, offset, |location, info| {
            let number = info.block_number();
            let expected = checkpoint.next_block_number();
            if number != expected {
                return Err(recovery_failed(
                    ledger_id,
                    format!("found block {number} at {location}, expected {expected}"),
                ));
            }
            if !checkpoint.is_chain_empty
                && info.block_header.previous_hash != checkpoint.latest_block_hash
            {
                return Err(recovery_failed(
                    ledger_id,
                    format!("block {number} at {location} does not chain onto block {}", number - 1),
                ));
            }
            checkpoint.latest_block_number = number;
            checkpoint.latest_block_hash = info.block_header.hash();
            checkpoint.is_chain_empty = false;
            Ok(())
        })?;

        if outcome.blocks > 0 || file_id == checkpoint.latest_file_id {
            checkpoint.latest_file_id = file_id;
            checkpoint.latest_file_size = outcome.end_offset;
        }
        if outcome.blocks > 0 {
            extended_files.push(file_id);
            tracing::info!(file = file_id, blocks = outcome.blocks, "recovered blocks past the checkpoint");
        }

        let next_path = block_file_path(dir, file_id + 1);
        let next_has_data = file_len(&next_path)?.is_some_and(|len| len > 0);

        if let Some((torn_offset, reason)) = outcome.torn_at {
            if next_has_data {
                return Err(recovery_failed(
                    ledger_id,
                    format!(
                        "block file {} is damaged at offset {torn_offset} ({reason}) but later files exist",
                        path.display()
                    ),
                ));
            }
            tracing::warn!(
                file = file_id,
                offset = torn_offset,
                reason,
                "discarding incomplete record at the end of the block file"
            );
            truncate(&path, outcome.end_offset)?;
            break;
        }

        if !next_has_data {
            break;
        }
        file_id += 1;
        offset = 0;
    }

    Ok(Recovered {
        checkpoint,
        extended_files,
    })
}

fn sync_file(path: &Path) -> Result<(), StorageError> {
    OpenOptions::new()
        .write(true)
        .open(path)
        .and_then(|file| file.sync_data())
        .map_err(StorageError::io(path))
}

fn truncate(path: &Path, len: u64) -> Result<(), StorageError> {
    let file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(StorageError::io(path))?;
    file.set_len(len).map_err(StorageError::io(path))?;
    file.sync_all().map_err(StorageError::io(path))
}

/// Bring the index up to the recovered checkpoint.
fn sync_index(
    ledger_id: &str,
    dir: &Path,
    index: &BlockIndex,
    checkpoint: &CheckpointInfo,
) -> Result<(), StorageError> {
    let next_indexed = index.get_index_checkpoint()?.map_or(0, |n| n + 1);
    let next_block = checkpoint.next_block_number();

    if next_indexed > next_block {
        return Err(recovery_failed(
            ledger_id,
            format!("index covers block {} but the block files end before it", next_indexed - 1),
        ));
    }
    if next_indexed == next_block {
        return Ok(());
    }

    let (file_id, offset) = match next_indexed.checked_sub(1) {
        None => (0, 0),
        Some(last) => match index.get_location_by_number(last)? {
            Some(location) => (location.file_id, location.end() + CHECKSUM_LEN),
            None => {
                tracing::warn!(block = last, "index checkpoint has no block entry, rebuilding from block 0");
                (0, 0)
            }
        },
    };

    tracing::warn!(
        from = next_indexed,
        to = next_block,
        "index is behind the block files, re-indexing"
    );

    let mut batch = IndexBatch::new();
    let mut in_batch = 0;
    let mut last_indexed = None;
    for record in BlockFileStream::open(dir, file_id, offset)? {
        let (location, bytes) = record?;
        let info = extract_block_info(&bytes)
            .map_err(|source| StorageError::BlockDecode { location, source })?;
        let number = info.block_number();
        if number < next_indexed {
            continue;
        }
        if number >= next_block {
            break;
        }
        batch.put_block(&info, &location)?;
        last_indexed = Some(number);
        in_batch += 1;

        if in_batch == REINDEX_BATCH_BLOCKS {
            batch.put_index_checkpoint(number)?;
            index.commit(std::mem::take(&mut batch), true)?;
            in_batch = 0;
        }
    }

    match last_indexed {
        Some(number) if number + 1 == next_block => {
            if in_batch > 0 {
                batch.put_index_checkpoint(number)?;
                index.commit(batch, true)?;
            }
            Ok(())
        }
        _ => Err(recovery_failed(
            ledger_id,
            format!("block files end before block {}", next_block - 1),
        )),
    }
}

/// Height and tip hashes for a recovered checkpoint.
fn blockchain_info(
    dir: &Path,
    index: &BlockIndex,
    checkpoint: &CheckpointInfo,
) -> Result<BlockchainInfo, StorageError> {
    if checkpoint.is_chain_empty {
        return Ok(BlockchainInfo::default());
    }
    let number = checkpoint.latest_block_number;
    let location = index
        .get_location_by_number(number)?
        .ok_or(StorageError::BlockNumberNotFound { number })?;
    let bytes = read_block_bytes(dir, &location)?;
    let tip = deserialize_block(&bytes)
        .map_err(|source| StorageError::BlockDecode { location, source })?;

    Ok(BlockchainInfo {
        height: number + 1,
        current_block_hash: checkpoint.latest_block_hash.clone(),
        previous_block_hash: tip.header.previous_hash,
    })
}
