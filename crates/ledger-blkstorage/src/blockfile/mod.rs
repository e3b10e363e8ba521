//! # Rolling Block Files
//!
//! A ledger's blocks live in a sequence of size-bounded files named
//! `blockfile_000000`, `blockfile_000001`, ... Each block is one record:
//!
//! ```text
//! uvarint(len) ‖ block bytes (len) ‖ crc32(block bytes), u32 little-endian
//! ```
//!
//! A [`Location`](crate::domain::entities::Location) addresses the block bytes
//! of a record, so index entries survive any change to the framing.
//!
//! - `writer`: append, flush and rollover
//! - `reader`: checked random reads and the sequential `BlockFileStream`
//! - `recovery`: scanning a file for its last complete record

mod reader;
mod recovery;
mod writer;

use std::fs;
use std::path::{Path, PathBuf};

pub use reader::{read_block_bytes, read_range, BlockFileStream};
pub use recovery::{scan_file, ScanOutcome};
pub use writer::BlockFileWriter;

use crate::domain::errors::StorageError;

const FILE_PREFIX: &str = "blockfile_";

/// Size of the checksum trailer of every record.
pub const CHECKSUM_LEN: u64 = 4;

/// Whether an append must reach stable storage before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Sync,
    NoSync,
}

/// Path of block file `file_id` inside `dir`.
pub fn block_file_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!("{FILE_PREFIX}{file_id:06}"))
}

/// Ids of the block files present in `dir`, ascending.
#[cfg(test)]
pub(crate) fn list_block_files(dir: &Path) -> Result<Vec<u32>, StorageError> {
    let mut ids = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
        Err(e) => return Err(StorageError::io(dir)(e)),
    };
    for entry in entries {
        let entry = entry.map_err(StorageError::io(dir))?;
        let name = entry.file_name();
        if let Some(id) = name
            .to_str()
            .and_then(|n| n.strip_prefix(FILE_PREFIX))
            .and_then(|n| n.parse::<u32>().ok())
        {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Length of a block file, or `None` if it does not exist.
pub(crate) fn file_len(path: &Path) -> Result<Option<u64>, StorageError> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::io(path)(e)),
    }
}

/// Make a newly created directory entry durable.
pub(crate) fn sync_dir(dir: &Path) -> Result<(), StorageError> {
    #[cfg(unix)]
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(StorageError::io(dir))?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}
