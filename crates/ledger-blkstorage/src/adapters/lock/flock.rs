//! # File Lock Implementation
//!
//! Uses `fs2` for cross-platform file locking (flock on Unix, LockFile on Windows).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::domain::errors::LockError;

/// Exclusive lock on a storage root, released on drop.
///
/// The lock file holds the PID of the owner for diagnostics. Acquisition does
/// not wait: a held lock fails immediately with `DatabaseLocked`.
#[derive(Debug)]
pub struct DatabaseLock {
    /// Kept open to maintain the lock.
    file: File,
    path: PathBuf,
    pid: u32,
}

impl DatabaseLock {
    /// Take the lock at `lock_path`, creating the file and its parent
    /// directory if needed.
    pub fn acquire(lock_path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: lock_path.to_path_buf(),
            source,
        };

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Not truncated before locking: the current holder's PID must survive
        // a failed attempt.
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)
            .map_err(io_err)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LockError::DatabaseLocked {
                path: lock_path.to_path_buf(),
                holder_pid: Self::read_existing_pid(lock_path),
            });
        }

        let pid = std::process::id();
        file.set_len(0).map_err(io_err)?;
        writeln!(file, "{}", pid).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        tracing::debug!(path = %lock_path.display(), pid, "acquired storage lock");

        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
            pid,
        })
    }

    /// PID written into the lock file.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_existing_pid(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

impl Drop for DatabaseLock {
    fn drop(&mut self) {
        // The file itself stays: unlinking it would let two openers lock
        // different inodes under the same path.
        #[allow(clippy::incompatible_msrv)]
        let _ = self.file.unlock();
        tracing::debug!(path = %self.path.display(), "released storage lock");
    }
}
