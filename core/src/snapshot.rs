//! Wire layout of the statistics snapshot published in shared memory.
//!
//! ```text
//! offset 0..4  revenue         i32 little-endian
//! offset 4..8  clients served  i32 little-endian
//! ```
//!
//! The Seller writes it after every sale; the Manager reads it once per
//! poll tick. Both sides hold the named mutex for the duration of the copy,
//! so a reader never sees half of one write and half of another.

use crate::stats::SalesStat;
use thiserror::Error;

/// Byte offset of the revenue field.
pub const REVENUE_OFFSET: usize = 0;

/// Byte offset of the clients-served field.
pub const CLIENTS_SERVED_OFFSET: usize = 4;

/// Number of bytes used by the snapshot.
pub const SNAPSHOT_LEN: usize = 8;

/// The fixed 8-byte encoding of a [`SalesStat`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SharedSnapshot([u8; SNAPSHOT_LEN]);

impl SharedSnapshot {
    /// Encode `stat`.
    #[must_use]
    pub fn from_stat(stat: SalesStat) -> Self {
        let mut bytes = [0u8; SNAPSHOT_LEN];
        bytes[REVENUE_OFFSET..REVENUE_OFFSET + 4].copy_from_slice(&stat.total_revenue.to_le_bytes());
        bytes[CLIENTS_SERVED_OFFSET..CLIENTS_SERVED_OFFSET + 4]
            .copy_from_slice(&stat.total_clients_served.to_le_bytes());
        Self(bytes)
    }

    /// Wrap raw bytes copied out of the segment.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SNAPSHOT_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw bytes to copy into the segment.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SNAPSHOT_LEN] {
        &self.0
    }

    /// Decode into a [`SalesStat`].
    #[must_use]
    pub const fn to_stat(&self) -> SalesStat {
        let b = &self.0;
        SalesStat {
            total_revenue: i32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            total_clients_served: i32::from_le_bytes([b[4], b[5], b[6], b[7]]),
        }
    }
}

/// Failure to reach the snapshot.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The cross-process lock could not be taken in time
    #[error("timed out waiting for the snapshot lock")]
    LockTimeout,

    /// Reading or writing the snapshot failed
    #[error("snapshot access failed: {0}")]
    Access(String),
}

/// Seller side: publish the current totals.
pub trait SnapshotPublisher: Send + Sync {
    /// Write `stat` as the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the lock or the write fails. Callers log
    /// and carry on.
    fn publish(&self, stat: SalesStat) -> Result<(), SnapshotError>;
}

/// Manager side: read the latest totals.
pub trait SnapshotSource: Send + Sync {
    /// Read the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if the lock or the read fails. Callers log
    /// and skip the tick.
    fn read(&self) -> Result<SalesStat, SnapshotError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_little_endian_at_fixed_offsets() {
        let snapshot = SharedSnapshot::from_stat(SalesStat::new(0x0102_0304, 7));

        assert_eq!(snapshot.as_bytes(), &[0x04, 0x03, 0x02, 0x01, 7, 0, 0, 0]);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let stat = SalesStat::new(600_000, 1234);
        assert_eq!(SharedSnapshot::from_stat(stat).to_stat(), stat);
    }

    #[test]
    fn zeroed_segment_reads_as_empty_stats() {
        assert_eq!(SharedSnapshot::from_bytes([0; 8]).to_stat(), SalesStat::default());
    }
}
