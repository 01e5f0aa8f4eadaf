//! # AirSales Runtime
//!
//! The two AirSales processes, assembled from the core types and the IPC
//! channels.
//!
//! ## Seller
//!
//! ```text
//! ClientFactory ──► ClientQueue ──► WorkerPool ──► SalesEngine
//!                                                   │  books seats
//!                                                   │  updates StatsRegister
//!                                                   └► SharedMemoryChannel
//! ```
//!
//! ## Manager
//!
//! ```text
//! SharedMemoryChannel ──► StatsPoller ──► threshold ──► TerminationArbiter
//!                         DepartureTimer ─────────────► TerminationArbiter
//! ```
//!
//! Each process owns one [`TerminationArbiter`](airsales_core::TerminationArbiter).
//! Its winner runs the registered handlers, which is where the control code
//! to the other process is sent from (see [`signals`]).
//!
//! ## Example
//!
//! ```rust,no_run
//! use airsales_core::SellerConfig;
//! use airsales_runtime::SellerProcess;
//!
//! # async fn example() -> Result<(), airsales_runtime::RuntimeError> {
//! let seller = SellerProcess::start(SellerConfig::from_env()).await?;
//! let totals = seller.run().await?;
//! println!("{totals}");
//! # Ok(())
//! # }
//! ```

/// Sales engine and worker pool
pub mod engine;

/// Error types
pub mod error;

/// Synthetic client source
pub mod factory;

/// Manager process: snapshot poller and departure timer
pub mod manager;

/// Prometheus metrics
pub mod metrics;

/// Client FIFO
pub mod queue;

/// Backoff for startup connections
pub mod retry;

/// Seller process
pub mod seller;

/// Termination and control-code glue
pub mod signals;

pub use engine::{SalesEngine, WorkerPool, WorkerReport};
pub use error::RuntimeError;
pub use factory::ClientFactory;
pub use manager::{DepartureTimer, ManagerProcess, StatsPoller};
pub use metrics::MetricsRecorder;
pub use queue::ClientQueue;
pub use retry::{RetryPolicy, retry_with_backoff};
pub use seller::SellerProcess;
pub use signals::{NotifyPeer, RecordTermination, TerminateOnControlCode};
