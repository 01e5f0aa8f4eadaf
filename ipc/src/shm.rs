//! The statistics snapshot in shared memory.
//!
//! [`SharedMemoryChannel`] pairs a [`SharedSegment`] with its
//! [`NamedMutex`]. Every read and write holds the mutex for the duration of
//! the 8-byte copy and nothing else.

use crate::error::IpcError;
use crate::mutex::NamedMutex;
use crate::segment::SharedSegment;
use airsales_core::config::IpcConfig;
use airsales_core::{SalesStat, SharedSnapshot, SnapshotError, SnapshotPublisher, SnapshotSource};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::info;

/// Handle on the named snapshot segment and its mutex.
#[derive(Debug)]
pub struct SharedMemoryChannel {
    segment: Mutex<SharedSegment>,
    mutex: NamedMutex,
    lock_timeout: Duration,
}

impl SharedMemoryChannel {
    /// Seller side: create the segment and mutex and zero the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError`] if either object cannot be created or the
    /// initial write fails.
    pub fn create(config: &IpcConfig) -> Result<Self, IpcError> {
        let segment = SharedSegment::create(&config.segment_path(), config.segment_size)?;
        let mutex = NamedMutex::create(&config.mutex_path())?;

        let channel = Self::new(segment, mutex, config.lock_timeout());
        channel.reset()?;

        info!(
            name = %config.shared_name,
            dir = %config.shm_dir.display(),
            size = config.segment_size,
            "Shared memory ready"
        );
        Ok(channel)
    }

    /// Manager side: open the segment and mutex the Seller created.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::SegmentNotFound`] or [`IpcError::MutexNotFound`]
    /// when the Seller has not created them yet.
    pub fn open_existing(config: &IpcConfig) -> Result<Self, IpcError> {
        let segment = SharedSegment::open_existing(&config.segment_path())?;
        let mutex = NamedMutex::open_existing(&config.mutex_path())?;

        info!(name = %config.shared_name, "Attached to shared memory");
        Ok(Self::new(segment, mutex, config.lock_timeout()))
    }

    const fn new(segment: SharedSegment, mutex: NamedMutex, lock_timeout: Duration) -> Self {
        Self {
            segment: Mutex::new(segment),
            mutex,
            lock_timeout,
        }
    }

    /// Write `snapshot` under the named mutex.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::LockTimeout`] if the mutex is not acquired in time.
    pub fn write_snapshot(&self, snapshot: SharedSnapshot) -> Result<(), IpcError> {
        let _guard = self.mutex.acquire(self.lock_timeout)?;
        self.segment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write_snapshot_bytes(snapshot.as_bytes());
        Ok(())
    }

    /// Read the snapshot under the named mutex.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::LockTimeout`] if the mutex is not acquired in time.
    pub fn read_snapshot(&self) -> Result<SharedSnapshot, IpcError> {
        let _guard = self.mutex.acquire(self.lock_timeout)?;
        let bytes = self
            .segment
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read_snapshot_bytes();
        Ok(SharedSnapshot::from_bytes(bytes))
    }

    /// Zero the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::LockTimeout`] if the mutex is not acquired in time.
    pub fn reset(&self) -> Result<(), IpcError> {
        self.write_snapshot(SharedSnapshot::default())
    }
}

impl SnapshotPublisher for SharedMemoryChannel {
    fn publish(&self, stat: SalesStat) -> Result<(), SnapshotError> {
        self.write_snapshot(SharedSnapshot::from_stat(stat))
            .map_err(SnapshotError::from)
    }
}

impl SnapshotSource for SharedMemoryChannel {
    fn read(&self) -> Result<SalesStat, SnapshotError> {
        self.read_snapshot()
            .map(|snapshot| snapshot.to_stat())
            .map_err(SnapshotError::from)
    }
}
