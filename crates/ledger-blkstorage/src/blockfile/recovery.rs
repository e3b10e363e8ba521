use std::path::Path;

use super::reader::{RecordRead, RecordReader};
use crate::domain::codec::extract_block_info;
use crate::domain::entities::{Location, SerializedBlockInfo};
use crate::domain::errors::StorageError;

/// Result of scanning one block file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Offset just past the last complete record.
    pub end_offset: u64,
    /// Complete records seen.
    pub blocks: u64,
    /// Where the tail went bad, if the file does not end on a record boundary.
    pub torn_at: Option<(u64, &'static str)>,
}

impl ScanOutcome {
    pub fn is_torn(&self) -> bool {
        self.torn_at.is_some()
    }
}

/// Walk the records of block file `file_id` from `offset` to the end.
///
/// `on_block` sees every complete record in order and may reject it. An
/// incomplete or checksum-failing record ends the scan and is reported in
/// `torn_at`. A record with a valid checksum that does not decode is an error:
/// those bytes were written whole and cannot be explained by a crash.
pub fn scan_file(
    dir: &Path,
    file_id: u32,
    offset: u64,
    mut on_block: impl FnMut(Location, &SerializedBlockInfo) -> Result<(), StorageError>,
) -> Result<ScanOutcome, StorageError> {
    let mut reader = RecordReader::open(dir, file_id, offset)?;
    let mut blocks = 0;

    loop {
        match reader.next_record()? {
            RecordRead::Record { location, bytes } => {
                let info = extract_block_info(&bytes)
                    .map_err(|source| StorageError::BlockDecode { location, source })?;
                on_block(location, &info)?;
                blocks += 1;
            }
            RecordRead::End => {
                return Ok(ScanOutcome {
                    end_offset: reader.position(),
                    blocks,
                    torn_at: None,
                })
            }
            RecordRead::Torn { offset, reason } => {
                return Ok(ScanOutcome {
                    end_offset: reader.position(),
                    blocks,
                    torn_at: Some((offset, reason)),
                })
            }
        }
    }
}
