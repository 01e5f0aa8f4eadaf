//! Error types for the Seller and Manager processes.

use airsales_core::ConfigError;
use airsales_ipc::IpcError;
use thiserror::Error;

/// Errors that stop a process from starting or finishing cleanly.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Shared memory or control transport failure
    #[error(transparent)]
    Ipc(#[from] IpcError),

    /// A worker thread could not be started
    #[error("failed to spawn worker {worker}: {source}")]
    WorkerSpawn {
        /// 1-based worker id
        worker: usize,
        /// Underlying error
        source: std::io::Error,
    },

    /// A worker thread panicked
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    /// A background task failed to complete
    #[error("background task failed: {0}")]
    Task(String),

    /// Metrics exporter could not be installed
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
