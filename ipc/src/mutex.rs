//! Named cross-process mutex.
//!
//! The mutex is an advisory lock on a lock file next to the segment. File
//! locks are held per open file, not per thread, so an in-process mutex
//! serialises the threads of one process before they contend for the file
//! lock with the other process.
//!
//! Acquisition polls with a short sleep until the timeout elapses. The
//! returned [`NamedMutexGuard`] releases both locks when dropped, on every
//! exit path.

use crate::error::IpcError;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// A mutex shared by name between processes.
#[derive(Debug)]
pub struct NamedMutex {
    path: PathBuf,
    file: File,
    local: Mutex<()>,
    owner: bool,
}

impl NamedMutex {
    /// Create the mutex at `path` (or reuse a stale lock file).
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::Io`] if the lock file cannot be created.
    pub fn create(path: &Path) -> Result<Self, IpcError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        debug!(path = %path.display(), "Created named mutex");
        Ok(Self::new(path, file, true))
    }

    /// Open a mutex some other process created.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::MutexNotFound`] if nothing exists at `path`, or
    /// [`IpcError::Io`] for any other failure.
    pub fn open_existing(path: &Path) -> Result<Self, IpcError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => IpcError::MutexNotFound(path.to_path_buf()),
                _ => IpcError::Io(e),
            })?;

        debug!(path = %path.display(), "Opened named mutex");
        Ok(Self::new(path, file, false))
    }

    fn new(path: &Path, file: File, owner: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            file,
            local: Mutex::new(()),
            owner,
        }
    }

    /// Lock file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait up to `timeout` for the mutex.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::LockTimeout`] if the mutex stays held, or
    /// [`IpcError::Io`] if the lock call itself fails.
    pub fn acquire(&self, timeout: Duration) -> Result<NamedMutexGuard<'_>, IpcError> {
        let deadline = Instant::now() + timeout;
        let local = self.local.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            match self.file.try_lock() {
                Ok(()) => {
                    return Ok(NamedMutexGuard {
                        mutex: self,
                        _local: local,
                    });
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(IpcError::LockTimeout(timeout));
                    }
                    thread::sleep(RETRY_INTERVAL);
                }
                Err(TryLockError::Error(e)) => return Err(IpcError::Io(e)),
            }
        }
    }
}

impl Drop for NamedMutex {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed named mutex"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove named mutex"),
        }
    }
}

/// Held [`NamedMutex`]; released on drop.
#[derive(Debug)]
pub struct NamedMutexGuard<'a> {
    mutex: &'a NamedMutex,
    _local: MutexGuard<'a, ()>,
}

impl Drop for NamedMutexGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.mutex.file.unlock() {
            warn!(path = %self.mutex.path.display(), error = %e, "Failed to release named mutex");
        }
    }
}
