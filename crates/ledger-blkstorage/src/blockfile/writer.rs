use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use ledger_types::wire::put_uvarint;

use super::{block_file_path, sync_dir, SyncMode};
use crate::domain::entities::Location;
use crate::domain::errors::StorageError;

/// Sequential writer over a ledger's rolling block files.
///
/// Owned by the store's write lock; never shared.
pub struct BlockFileWriter {
    dir: PathBuf,
    file_id: u32,
    file: File,
    size: u64,
    max_size: u64,
    unsynced: bool,
}

impl BlockFileWriter {
    /// Open file `file_id` for appending at `size`.
    ///
    /// Bytes past `size` are discarded; recovery has already established that
    /// nothing committed lives there.
    pub fn open(dir: &Path, file_id: u32, size: u64, max_size: u64) -> Result<Self, StorageError> {
        let path = block_file_path(dir, file_id);
        let file = open_for_append(&path)?;
        let current = file.metadata().map_err(StorageError::io(&path))?.len();
        if current != size {
            file.set_len(size).map_err(StorageError::io(&path))?;
            file.sync_all().map_err(StorageError::io(&path))?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            file_id,
            file,
            size,
            max_size,
            unsynced: false,
        })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// Bytes written to the current file, synced or not.
    pub fn size(&self) -> u64 {
        self.size
    }

    #[cfg(test)]
    pub(crate) fn has_unsynced(&self) -> bool {
        self.unsynced
    }

    /// Append one block record and return the location of its block bytes.
    ///
    /// Rolls over to a new file first when the record would push a non-empty
    /// file past the size limit. On a failed write the partial record is cut
    /// off again.
    pub fn append(&mut self, block_bytes: &[u8], mode: SyncMode) -> Result<Location, StorageError> {
        let length = u32::try_from(block_bytes.len()).map_err(|_| StorageError::Serialization {
            message: format!(
                "block of {} bytes exceeds the record size limit",
                block_bytes.len()
            ),
        })?;

        let mut record = Vec::with_capacity(block_bytes.len() + 14);
        put_uvarint(&mut record, u64::from(length));
        let header_len = record.len() as u64;
        record.extend_from_slice(block_bytes);
        record.extend_from_slice(&crc32fast::hash(block_bytes).to_le_bytes());

        if self.size > 0 && self.size + record.len() as u64 > self.max_size {
            self.roll_over()?;
        }

        let path = self.path();
        if let Err(e) = self.file.write_all(&record) {
            if let Err(trunc) = self.file.set_len(self.size) {
                tracing::error!(path = %path.display(), error = %trunc, "failed to cut off partial record");
            }
            return Err(StorageError::Io { path, source: e });
        }

        let location = Location::new(self.file_id, self.size + header_len, length);
        self.size += record.len() as u64;
        self.unsynced = true;

        if mode == SyncMode::Sync {
            self.flush()?;
        }
        Ok(location)
    }

    /// Force everything written to the current file to stable storage.
    pub fn flush(&mut self) -> Result<(), StorageError> {
        if self.unsynced {
            self.file.sync_data().map_err(StorageError::io(self.path()))?;
            self.unsynced = false;
        }
        Ok(())
    }

    /// Seal the current file and continue in the next one.
    fn roll_over(&mut self) -> Result<(), StorageError> {
        self.flush()?;

        let next_id = self.file_id + 1;
        let path = block_file_path(&self.dir, next_id);
        let file = open_for_append(&path)?;
        // A leftover file past the checkpoint holds nothing committed.
        file.set_len(0).map_err(StorageError::io(&path))?;
        sync_dir(&self.dir)?;

        tracing::info!(
            sealed_file = self.file_id,
            sealed_size = self.size,
            next_file = next_id,
            "rolled over to a new block file"
        );
        self.file = file;
        self.file_id = next_id;
        self.size = 0;
        Ok(())
    }

    fn path(&self) -> PathBuf {
        block_file_path(&self.dir, self.file_id)
    }
}

fn open_for_append(path: &Path) -> Result<File, StorageError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(StorageError::io(path))
}
