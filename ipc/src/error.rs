//! Error types for shared memory and the control transport.

use airsales_core::{ControlSendError, SnapshotError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors from the inter-process channels.
#[derive(Error, Debug)]
pub enum IpcError {
    /// The named segment has not been created by the Seller
    #[error("shared memory segment not found: {}", .0.display())]
    SegmentNotFound(PathBuf),

    /// The named segment cannot hold a snapshot
    #[error("shared memory segment {} holds {actual} bytes, need at least {required}", path.display())]
    SegmentTooSmall {
        /// Segment path
        path: PathBuf,
        /// Size found
        actual: u64,
        /// Minimum size
        required: usize,
    },

    /// The named mutex has not been created by the Seller
    #[error("named mutex not found: {}", .0.display())]
    MutexNotFound(PathBuf),

    /// The named mutex stayed held for the whole wait
    #[error("timed out after {0:?} waiting for the named mutex")]
    LockTimeout(Duration),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No control peer is connected
    #[error("control peer not connected")]
    NotConnected,

    /// The control connection was closed
    #[error("control connection closed")]
    ConnectionClosed,
}

impl From<IpcError> for SnapshotError {
    fn from(error: IpcError) -> Self {
        match error {
            IpcError::LockTimeout(_) => Self::LockTimeout,
            other => Self::Access(other.to_string()),
        }
    }
}

impl From<IpcError> for ControlSendError {
    fn from(error: IpcError) -> Self {
        match error {
            IpcError::NotConnected => Self::NotConnected,
            _ => Self::ConnectionClosed,
        }
    }
}
