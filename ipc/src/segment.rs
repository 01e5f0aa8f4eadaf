//! Named shared-memory segment backed by a memory-mapped file.
//!
//! The Seller creates the segment; the Manager only ever opens an existing
//! one. On Linux the default directory is `/dev/shm`, so the mapping lives in
//! RAM just like a POSIX shared-memory object.

use crate::error::IpcError;
use airsales_core::snapshot::SNAPSHOT_LEN;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A mapped view of a named segment.
///
/// The creating side owns the name and unlinks it on drop.
#[derive(Debug)]
pub struct SharedSegment {
    path: PathBuf,
    map: MmapMut,
    owner: bool,
}

impl SharedSegment {
    /// Create the segment at `path` with `size` bytes, or open and resize an
    /// existing one left over from an earlier run.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::SegmentTooSmall`] if `size` cannot hold a
    /// snapshot, or [`IpcError::Io`] if the file cannot be created or mapped.
    pub fn create(path: &Path, size: usize) -> Result<Self, IpcError> {
        if size < SNAPSHOT_LEN {
            return Err(IpcError::SegmentTooSmall {
                path: path.to_path_buf(),
                actual: size as u64,
                required: SNAPSHOT_LEN,
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.set_len(size as u64)?;

        let map = map_file(&file, size)?;
        debug!(path = %path.display(), size, "Created shared memory segment");

        Ok(Self {
            path: path.to_path_buf(),
            map,
            owner: true,
        })
    }

    /// Open a segment some other process created.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::SegmentNotFound`] if nothing exists at `path`,
    /// [`IpcError::SegmentTooSmall`] if it cannot hold a snapshot, or
    /// [`IpcError::Io`] for any other failure.
    pub fn open_existing(path: &Path) -> Result<Self, IpcError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => IpcError::SegmentNotFound(path.to_path_buf()),
                _ => IpcError::Io(e),
            })?;

        let len = file.metadata()?.len();
        let size = usize::try_from(len).unwrap_or(0);
        if size < SNAPSHOT_LEN {
            return Err(IpcError::SegmentTooSmall {
                path: path.to_path_buf(),
                actual: len,
                required: SNAPSHOT_LEN,
            });
        }

        let map = map_file(&file, size)?;
        debug!(path = %path.display(), size, "Opened shared memory segment");

        Ok(Self {
            path: path.to_path_buf(),
            map,
            owner: false,
        })
    }

    /// Segment path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mapped size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True for a zero-length mapping (never the case once constructed).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Copy the first [`SNAPSHOT_LEN`] bytes out of the segment.
    #[must_use]
    pub fn read_snapshot_bytes(&self) -> [u8; SNAPSHOT_LEN] {
        let mut bytes = [0u8; SNAPSHOT_LEN];
        bytes.copy_from_slice(&self.map[..SNAPSHOT_LEN]);
        bytes
    }

    /// Overwrite the first [`SNAPSHOT_LEN`] bytes of the segment.
    pub fn write_snapshot_bytes(&mut self, bytes: &[u8; SNAPSHOT_LEN]) {
        self.map[..SNAPSHOT_LEN].copy_from_slice(bytes);
    }
}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed shared memory segment"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove shared memory segment"),
        }
    }
}

#[allow(unsafe_code)]
fn map_file(file: &File, size: usize) -> Result<MmapMut, IpcError> {
    // SAFETY: the file is sized before mapping and only ever resized by the
    // creating process before any reader opens it. All access to the mapped
    // bytes goes through `SharedMemoryChannel`, which holds the named mutex.
    let map = unsafe { MmapOptions::new().len(size).map_mut(file)? };
    Ok(map)
}
