use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use ledger_types::wire::{put_raw_bytes, put_uvarint, WireReader};
use parking_lot::RwLock;

use super::memory::scan;
use crate::domain::errors::KVStoreError;
use crate::ports::outbound::{KeyValueStore, WriteBatch};

const MAGIC: &[u8; 4] = b"LKV1";
const TRAILER_LEN: usize = 4;

/// File-backed key-value store for deployments without RocksDB.
///
/// The whole map lives in memory and is rewritten to a single file on every
/// synced write (write temp file, fsync, rename). Unsynced writes are visible
/// immediately and reach the file with the next synced write or `close`.
///
/// File format: `"LKV1" ‖ uvarint(count) ‖ (bytes(key) bytes(value))* ‖ crc32`.
pub struct FileBackedKVStore {
    path: PathBuf,
    state: RwLock<Option<State>>,
}

struct State {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    dirty: bool,
}

impl FileBackedKVStore {
    /// Open the store at `path`, loading existing contents.
    ///
    /// A missing file is an empty store. A file that fails its checksum is
    /// reported as corruption rather than silently discarded.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, KVStoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let data = match fs::read(&path) {
            Ok(bytes) => decode(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(io_error(e)),
        };
        tracing::info!(
            path = %path.display(),
            keys = data.len(),
            "opened file-backed index store"
        );

        Ok(Self {
            path,
            state: RwLock::new(Some(State { data, dirty: false })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<(), KVStoreError> {
        let bytes = encode(data);

        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path).map_err(io_error)?;
        file.write_all(&bytes).map_err(io_error)?;
        file.sync_all().map_err(io_error)?;
        fs::rename(&temp_path, &self.path).map_err(io_error)?;

        #[cfg(unix)]
        if let Some(parent) = self.path.parent() {
            File::open(parent)
                .and_then(|dir| dir.sync_all())
                .map_err(io_error)?;
        }
        Ok(())
    }

    fn write_with(
        &self,
        sync: bool,
        apply: impl FnOnce(&mut BTreeMap<Vec<u8>, Vec<u8>>),
    ) -> Result<(), KVStoreError> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(KVStoreError::Closed)?;
        if !sync {
            apply(&mut state.data);
            state.dirty = true;
            return Ok(());
        }

        // A synced write becomes visible only once it is on disk.
        let mut next = state.data.clone();
        apply(&mut next);
        self.persist(&next)?;
        state.data = next;
        state.dirty = false;
        Ok(())
    }
}

impl KeyValueStore for FileBackedKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, KVStoreError> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(KVStoreError::Closed)?;
        Ok(state.data.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8], sync: bool) -> Result<(), KVStoreError> {
        self.write_with(sync, |data| {
            data.insert(key.to_vec(), value.to_vec());
        })
    }

    fn atomic_batch_write(&self, batch: WriteBatch, sync: bool) -> Result<(), KVStoreError> {
        self.write_with(sync, |data| data.extend(batch))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, KVStoreError> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(KVStoreError::Closed)?;
        Ok(scan(&state.data, prefix))
    }

    fn close(&self) -> Result<(), KVStoreError> {
        let mut guard = self.state.write();
        if let Some(state) = guard.take() {
            if state.dirty {
                self.persist(&state.data)?;
            }
            tracing::info!(path = %self.path.display(), "closed file-backed index store");
        }
        Ok(())
    }
}

impl Drop for FileBackedKVStore {
    fn drop(&mut self) {
        if let Some(state) = self.state.get_mut().take() {
            if state.dirty {
                if let Err(e) = self.persist(&state.data) {
                    tracing::warn!(path = %self.path.display(), error = %e, "failed to persist index store on drop");
                }
            }
        }
    }
}

fn io_error(e: std::io::Error) -> KVStoreError {
    KVStoreError::IOError {
        message: e.to_string(),
    }
}

fn corruption(message: impl Into<String>) -> KVStoreError {
    KVStoreError::CorruptionError {
        message: message.into(),
    }
}

fn encode(data: &BTreeMap<Vec<u8>, Vec<u8>>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(
        16 + data
            .iter()
            .map(|(k, v)| k.len() + v.len() + 4)
            .sum::<usize>(),
    );
    bytes.extend_from_slice(MAGIC);
    put_uvarint(&mut bytes, data.len() as u64);
    for (key, value) in data {
        put_raw_bytes(&mut bytes, key);
        put_raw_bytes(&mut bytes, value);
    }
    let crc = crc32fast::hash(&bytes);
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes
}

fn decode(bytes: &[u8]) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, KVStoreError> {
    if bytes.len() < MAGIC.len() + TRAILER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(corruption("index file has no valid header"));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - TRAILER_LEN);
    let mut stored = [0u8; TRAILER_LEN];
    stored.copy_from_slice(trailer);
    let stored = u32::from_le_bytes(stored);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(corruption(format!(
            "index file checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
        )));
    }

    let mut reader = WireReader::new(&body[MAGIC.len()..]);
    let read_err = |e: ledger_types::WireError| corruption(e.to_string());
    let count = reader.read_uvarint().map_err(read_err)?;
    let mut data = BTreeMap::new();
    for _ in 0..count {
        let key = reader.read_raw_bytes().map_err(read_err)?;
        let value = reader.read_raw_bytes().map_err(read_err)?;
        data.insert(key.to_vec(), value.to_vec());
    }
    if !reader.is_empty() {
        return Err(corruption("index file has trailing bytes"));
    }
    Ok(data)
}
