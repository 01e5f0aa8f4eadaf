//! # AirSales Core
//!
//! Domain types and process-local coordination state for the AirSales
//! ticket-sales simulation.
//!
//! The system runs as two cooperating processes:
//!
//! - **Seller**: a worker pool drains a queue of synthetic clients and books
//!   seats from a fixed [`inventory::SeatInventory`], keeping running totals in
//!   a [`stats::StatsRegister`].
//! - **Manager**: polls the Seller's published [`snapshot::SharedSnapshot`] and
//!   can halt the Seller with a one-byte [`control::ControlCode`].
//!
//! This crate holds everything both sides agree on and nothing that touches
//! the OS: the booking policy, the statistics model, the wire formats, and
//! the at-most-once [`termination::TerminationArbiter`]. Transport and shared
//! memory live in `airsales-ipc`; process wiring lives in `airsales-runtime`.
//!
//! ## Seams
//!
//! Side effects cross component boundaries through small traits so each
//! piece can be tested with an in-memory double:
//!
//! - [`control::ControlSender`]: send a control code to the peer process
//! - [`snapshot::SnapshotPublisher`] / [`snapshot::SnapshotSource`]: publish or
//!   read the shared statistics snapshot
//! - [`termination::TerminationHandler`]: run a shutdown side effect once

/// Configuration for both processes
pub mod config;

/// One-byte control protocol between Manager and Seller
pub mod control;

/// Seat inventory and booking policy
pub mod inventory;

/// Fixed 8-byte statistics snapshot layout
pub mod snapshot;

/// Aggregate sales statistics
pub mod stats;

/// At-most-once termination state machine
pub mod termination;

/// Identifiers and small value types
pub mod types;

pub use config::{ConfigError, IpcConfig, ManagerConfig, SellerConfig};
pub use control::{ControlCode, ControlCodeError, ControlSendError, ControlSender};
pub use inventory::{Flight, SeatInventory, SeatPricing};
pub use snapshot::{SharedSnapshot, SnapshotError, SnapshotPublisher, SnapshotSource};
pub use stats::{SalesStat, StatsRegister};
pub use termination::{
    FnTerminationHandler, ProcessRole, TerminationArbiter, TerminationHandler, TerminationReason,
};
pub use types::{Booking, Client, ClientId, ClientSequence, FlightId, SeatClass, WorkerId};
