//! # AirSales IPC
//!
//! The two channels between the Seller and Manager processes:
//!
//! - [`shm::SharedMemoryChannel`]: the 8-byte statistics snapshot in a named
//!   shared-memory segment, guarded by a [`mutex::NamedMutex`]
//! - [`control`]: the one-byte control protocol over loopback TCP
//!
//! Only the Seller creates the shared objects. The Manager opens them and
//! fails with [`IpcError::SegmentNotFound`] or [`IpcError::MutexNotFound`]
//! when they are missing.

/// One-byte control transport
pub mod control;

/// Error types
pub mod error;

/// Named cross-process mutex
pub mod mutex;

/// Memory-mapped named segment
pub mod segment;

/// Snapshot publish and poll
pub mod shm;

pub use control::{
    ControlClient, ControlConnection, ControlHandler, ControlLink, ControlServer,
    ControlServerHandle, dispatch,
};
pub use error::IpcError;
pub use mutex::{NamedMutex, NamedMutexGuard};
pub use segment::SharedSegment;
pub use shm::SharedMemoryChannel;
