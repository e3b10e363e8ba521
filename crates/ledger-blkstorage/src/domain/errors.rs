//! # Domain Errors
//!
//! Error types for the block storage subsystem.
//!
//! Every public operation returns [`StorageError`]. Callers that need to react
//! differently to the failure kinds use the classification helpers:
//!
//! | Kind | Helper | Caller action |
//! |------|--------|---------------|
//! | Sequencing | `is_sequencing()` | resubmit the correct next block |
//! | Not found | `is_not_found()` | the entry never existed |
//! | Corruption | `is_corruption()` | the entry exists but is damaged |
//! | I/O | `is_io()` | the operation failed; a writer may need a reopen |

use std::path::PathBuf;

use ledger_types::WireError;
use thiserror::Error;

use crate::domain::entities::Location;

/// Errors raised while decoding block bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A section of the block could not be read.
    #[error("malformed block {section}: {source}")]
    Malformed {
        section: &'static str,
        #[source]
        source: WireError,
    },

    /// Bytes remained after the metadata section.
    #[error("{count} trailing bytes after block metadata")]
    TrailingBytes { count: usize },

    /// A metadata entry name was not UTF-8.
    #[error("metadata entry {index} has a non UTF-8 name")]
    InvalidMetadataName { index: u64 },
}

impl CodecError {
    pub(crate) fn malformed(section: &'static str) -> impl FnOnce(WireError) -> CodecError {
        move |source| CodecError::Malformed { section, source }
    }
}

/// Key-value store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KVStoreError {
    /// I/O error during read/write.
    #[error("KV store I/O error: {message}")]
    IOError { message: String },

    /// Data corruption in the store.
    #[error("KV store corruption: {message}")]
    CorruptionError { message: String },

    /// The store has been closed.
    #[error("KV store is closed")]
    Closed,
}

/// Errors raised while taking the storage root lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another process holds the lock.
    #[error(
        "database locked: {} is held by another process{}",
        path.display(),
        holder_suffix(*holder_pid)
    )]
    DatabaseLocked {
        path: PathBuf,
        holder_pid: Option<u32>,
    },

    /// The lock file could not be created or written.
    #[error("lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn holder_suffix(pid: Option<u32>) -> String {
    pid.map(|pid| format!(" (pid {pid})")).unwrap_or_default()
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The block does not carry the next expected number.
    #[error("unexpected block number: expected {expected}, got {got}")]
    UnexpectedBlockNumber { expected: u64, got: u64 },

    /// The block does not chain onto the current tip.
    #[error(
        "previous hash of block {number} is {}, expected {}",
        hex::encode(actual),
        hex::encode(expected)
    )]
    PreviousHashMismatch {
        number: u64,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    /// No block exists with this number.
    #[error("no block with number {number}")]
    BlockNumberNotFound { number: u64 },

    /// No block exists with this hash.
    #[error("no block with hash {}", hex::encode(hash))]
    BlockHashNotFound { hash: Vec<u8> },

    /// No transaction exists with this id.
    #[error("no transaction with id {tx_id:?}")]
    TxNotFound { tx_id: String },

    /// The block exists but has fewer transactions.
    #[error("no transaction {tx_num} in block {block_num}")]
    TxNumberNotFound { block_num: u64, tx_num: u64 },

    /// Stored block bytes did not decode.
    #[error("failed to decode block at {location}: {source}")]
    BlockDecode {
        location: Location,
        #[source]
        source: CodecError,
    },

    /// An index value did not decode as the structure its key implies.
    #[error(
        "corrupt index value under key {}: {message} (raw value {})",
        hex::encode(key),
        hex::encode(value)
    )]
    CorruptIndexValue {
        key: Vec<u8>,
        value: Vec<u8>,
        message: String,
    },

    /// A stored record failed its checksum.
    #[error("checksum mismatch for record at {location}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        location: Location,
        stored: u32,
        computed: u32,
    },

    /// An index entry points past the end of its block file.
    #[error("record at {location} extends past the end of the file ({file_len} bytes)")]
    RecordOutOfBounds { location: Location, file_len: u64 },

    /// A block file holds an incomplete or damaged record where a complete
    /// one is required.
    #[error("torn record in {} at offset {offset}: {reason}", path.display())]
    TornRecord {
        path: PathBuf,
        offset: u64,
        reason: &'static str,
    },

    /// The shared index handle has been closed.
    #[error("index unavailable: the index database has been closed")]
    IndexUnavailable,

    /// The index engine reported an error.
    #[error("index database error: {0}")]
    Database(KVStoreError),

    /// Filesystem error on a block file or directory.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An earlier write failure left the writer unusable.
    #[error("writer for ledger {ledger_id} failed earlier; reopen the ledger to recover")]
    WriterFailed { ledger_id: String },

    /// Recovery on open could not reconcile files and index.
    #[error("recovery of ledger {ledger_id} failed: {message}")]
    RecoveryFailed { ledger_id: String, message: String },

    /// The store has been shut down.
    #[error("block store for ledger {ledger_id} is shut down")]
    StoreClosed { ledger_id: String },

    /// The provider has been closed.
    #[error("block store provider is closed")]
    ProviderClosed,

    /// The ledger id cannot name a ledger directory.
    #[error("invalid ledger id {ledger_id:?}: {reason}")]
    InvalidLedgerId {
        ledger_id: String,
        reason: &'static str,
    },

    /// A configuration value could not be parsed.
    #[error("invalid configuration value {value:?} for {key}")]
    InvalidConfig { key: &'static str, value: String },

    /// An index value could not be encoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },

    /// The storage root lock could not be taken.
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl From<KVStoreError> for StorageError {
    fn from(err: KVStoreError) -> Self {
        match err {
            KVStoreError::Closed => StorageError::IndexUnavailable,
            other => StorageError::Database(other),
        }
    }
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StorageError {
        let path = path.into();
        move |source| StorageError::Io { path, source }
    }

    /// The call was rejected because of block ordering; store state is unchanged.
    pub fn is_sequencing(&self) -> bool {
        matches!(
            self,
            StorageError::UnexpectedBlockNumber { .. } | StorageError::PreviousHashMismatch { .. }
        )
    }

    /// The requested entry does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::BlockNumberNotFound { .. }
                | StorageError::BlockHashNotFound { .. }
                | StorageError::TxNotFound { .. }
                | StorageError::TxNumberNotFound { .. }
        )
    }

    /// The requested entry exists but its stored form is damaged.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            StorageError::BlockDecode { .. }
                | StorageError::CorruptIndexValue { .. }
                | StorageError::ChecksumMismatch { .. }
                | StorageError::RecordOutOfBounds { .. }
                | StorageError::TornRecord { .. }
                | StorageError::Database(KVStoreError::CorruptionError { .. })
        )
    }

    /// The underlying storage failed or is no longer available.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            StorageError::Io { .. }
                | StorageError::IndexUnavailable
                | StorageError::Database(KVStoreError::IOError { .. })
                | StorageError::WriterFailed { .. }
        )
    }
}
