//! Configuration for the Seller and Manager processes.
//!
//! Defaults reproduce the reference run; every value can be overridden from
//! `AIRSALES_*` environment variables. Unparseable values fall back to the
//! default.

use crate::inventory::SeatPricing;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Invalid configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The worker pool would be empty
    #[error("worker count must be at least 1")]
    NoWorkers,

    /// The inventory would be empty
    #[error("flight count must be at least 1")]
    NoFlights,

    /// The client inter-arrival range is empty or zero
    #[error("client interval range [{min}, {max}) ms is empty")]
    InvalidClientInterval {
        /// Inclusive lower bound
        min: u64,
        /// Exclusive upper bound
        max: u64,
    },

    /// The shared segment cannot hold a snapshot
    #[error("segment size {0} is smaller than the 8-byte snapshot")]
    SegmentTooSmall(usize),

    /// A periodic timer would spin
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Names and addresses both processes must agree on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpcConfig {
    /// Seller's control listener (Manager connects here)
    pub control_addr: String,
    /// Shared identifier the segment and mutex names derive from
    pub shared_name: String,
    /// Directory holding the named segment and mutex
    pub shm_dir: PathBuf,
    /// Size of the shared segment in bytes
    pub segment_size: usize,
    /// Maximum wait for the named mutex in milliseconds
    pub lock_timeout_ms: u64,
}

impl IpcConfig {
    /// Path of the named shared-memory segment.
    #[must_use]
    pub fn segment_path(&self) -> PathBuf {
        self.shm_dir.join(&self.shared_name)
    }

    /// Path of the named mutex.
    #[must_use]
    pub fn mutex_path(&self) -> PathBuf {
        self.shm_dir.join(format!("mutex-{}.lock", self.shared_name))
    }

    /// Named mutex wait limit.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            control_addr: env::var("AIRSALES_CONTROL_ADDR").unwrap_or(defaults.control_addr),
            shared_name: env::var("AIRSALES_SHARED_NAME").unwrap_or(defaults.shared_name),
            shm_dir: env::var("AIRSALES_SHM_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.shm_dir),
            segment_size: parse_env("AIRSALES_SEGMENT_SIZE", defaults.segment_size),
            lock_timeout_ms: parse_env("AIRSALES_LOCK_TIMEOUT_MS", defaults.lock_timeout_ms),
        }
    }
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            control_addr: "127.0.0.1:17000".to_string(),
            shared_name: "AirSalesProjectMMF".to_string(),
            shm_dir: default_shm_dir(),
            segment_size: 4096,
            lock_timeout_ms: 1000,
        }
    }
}

/// Seller process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SellerConfig {
    /// Shared names and addresses
    pub ipc: IpcConfig,
    /// Number of flights in the inventory
    pub flights: usize,
    /// First-class seats per flight
    pub first_class_seats: u32,
    /// Economy seats per flight
    pub economy_seats: u32,
    /// Ticket prices
    pub pricing: SeatPricing,
    /// Number of sales workers
    pub workers: usize,
    /// Worker backoff when the client queue is empty, in milliseconds
    pub worker_poll_ms: u64,
    /// Lower bound of the client inter-arrival interval, in milliseconds
    pub client_interval_min_ms: u64,
    /// Exclusive upper bound of the client inter-arrival interval, in milliseconds
    pub client_interval_max_ms: u64,
    /// Install the Prometheus recorder
    pub metrics: bool,
}

impl SellerConfig {
    /// Load from `AIRSALES_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ipc: IpcConfig::from_env(),
            flights: parse_env("AIRSALES_FLIGHTS", defaults.flights),
            first_class_seats: parse_env("AIRSALES_FIRST_CLASS_SEATS", defaults.first_class_seats),
            economy_seats: parse_env("AIRSALES_ECONOMY_SEATS", defaults.economy_seats),
            pricing: SeatPricing {
                first_class: parse_env("AIRSALES_FIRST_CLASS_PRICE", defaults.pricing.first_class),
                economy: parse_env("AIRSALES_ECONOMY_PRICE", defaults.pricing.economy),
            },
            workers: parse_env("AIRSALES_WORKERS", defaults.workers),
            worker_poll_ms: parse_env("AIRSALES_WORKER_POLL_MS", defaults.worker_poll_ms),
            client_interval_min_ms: parse_env(
                "AIRSALES_CLIENT_INTERVAL_MIN_MS",
                defaults.client_interval_min_ms,
            ),
            client_interval_max_ms: parse_env(
                "AIRSALES_CLIENT_INTERVAL_MAX_MS",
                defaults.client_interval_max_ms,
            ),
            metrics: parse_env("AIRSALES_METRICS", defaults.metrics),
        }
    }

    /// Reject settings the Seller cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an empty pool or inventory, an empty
    /// inter-arrival range, a zero poll interval, or an undersized segment.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.flights == 0 {
            return Err(ConfigError::NoFlights);
        }
        if self.client_interval_min_ms == 0 || self.client_interval_min_ms >= self.client_interval_max_ms {
            return Err(ConfigError::InvalidClientInterval {
                min: self.client_interval_min_ms,
                max: self.client_interval_max_ms,
            });
        }
        if self.worker_poll_ms == 0 {
            return Err(ConfigError::ZeroInterval("worker poll interval"));
        }
        if self.ipc.segment_size < crate::snapshot::SNAPSHOT_LEN {
            return Err(ConfigError::SegmentTooSmall(self.ipc.segment_size));
        }
        Ok(())
    }

    /// Worker backoff when the queue is empty.
    #[must_use]
    pub const fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_ms)
    }
}

impl Default for SellerConfig {
    fn default() -> Self {
        Self {
            ipc: IpcConfig::default(),
            flights: 3,
            first_class_seats: 12,
            economy_seats: 120,
            pricing: SeatPricing::default(),
            workers: 5,
            worker_poll_ms: 10,
            client_interval_min_ms: 5,
            client_interval_max_ms: 26,
            metrics: false,
        }
    }
}

/// Manager (controller) process configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Shared names and addresses
    pub ipc: IpcConfig,
    /// Shared-memory poll cadence in milliseconds
    pub poll_interval_ms: u64,
    /// Departure timer in seconds
    pub departure_secs: u64,
    /// Revenue at which the Manager halts sales
    pub revenue_threshold: i32,
    /// Readiness delay before opening the segment, in milliseconds
    pub startup_delay_ms: u64,
    /// Reconnect attempts after the first failed connect
    pub connect_retries: usize,
    /// Install the Prometheus recorder
    pub metrics: bool,
}

impl ManagerConfig {
    /// Load from `AIRSALES_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ipc: IpcConfig::from_env(),
            poll_interval_ms: parse_env("AIRSALES_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            departure_secs: parse_env("AIRSALES_DEPARTURE_SECS", defaults.departure_secs),
            revenue_threshold: parse_env("AIRSALES_REVENUE_THRESHOLD", defaults.revenue_threshold),
            startup_delay_ms: parse_env("AIRSALES_STARTUP_DELAY_MS", defaults.startup_delay_ms),
            connect_retries: parse_env("AIRSALES_CONNECT_RETRIES", defaults.connect_retries),
            metrics: parse_env("AIRSALES_METRICS", defaults.metrics),
        }
    }

    /// Reject settings the Manager cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroInterval`] for a zero poll interval.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("stats poll interval"));
        }
        Ok(())
    }

    /// Shared-memory poll cadence.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Departure timer.
    #[must_use]
    pub const fn departure_after(&self) -> Duration {
        Duration::from_secs(self.departure_secs)
    }

    /// Readiness delay.
    #[must_use]
    pub const fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            ipc: IpcConfig::default(),
            poll_interval_ms: 1000,
            departure_secs: 150,
            revenue_threshold: 600_000,
            startup_delay_ms: 3000,
            connect_retries: 5,
            metrics: false,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn default_shm_dir() -> PathBuf {
    let dev_shm = Path::new("/dev/shm");
    if dev_shm.is_dir() {
        dev_shm.to_path_buf()
    } else {
        env::temp_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_run() {
        let seller = SellerConfig::default();
        assert_eq!(seller.flights, 3);
        assert_eq!(seller.first_class_seats, 12);
        assert_eq!(seller.economy_seats, 120);
        assert_eq!(seller.workers, 5);
        assert_eq!((seller.client_interval_min_ms, seller.client_interval_max_ms), (5, 26));
        assert!(seller.validate().is_ok());

        let manager = ManagerConfig::default();
        assert_eq!(manager.revenue_threshold, 600_000);
        assert_eq!(manager.poll_interval(), Duration::from_secs(1));
        assert_eq!(manager.departure_after(), Duration::from_secs(150));
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn names_derive_from_shared_identifier() {
        let ipc = IpcConfig {
            shm_dir: PathBuf::from("/tmp/airsales"),
            ..IpcConfig::default()
        };

        assert_eq!(ipc.segment_path(), PathBuf::from("/tmp/airsales/AirSalesProjectMMF"));
        assert_eq!(
            ipc.mutex_path(),
            PathBuf::from("/tmp/airsales/mutex-AirSalesProjectMMF.lock")
        );
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let no_workers = SellerConfig {
            workers: 0,
            ..SellerConfig::default()
        };
        assert_eq!(no_workers.validate(), Err(ConfigError::NoWorkers));

        let empty_range = SellerConfig {
            client_interval_min_ms: 26,
            client_interval_max_ms: 26,
            ..SellerConfig::default()
        };
        assert_eq!(
            empty_range.validate(),
            Err(ConfigError::InvalidClientInterval { min: 26, max: 26 })
        );

        let mut tiny_segment = SellerConfig::default();
        tiny_segment.ipc.segment_size = 4;
        assert_eq!(tiny_segment.validate(), Err(ConfigError::SegmentTooSmall(4)));

        let no_poll = ManagerConfig {
            poll_interval_ms: 0,
            ..ManagerConfig::default()
        };
        assert!(no_poll.validate().is_err());
    }

    #[test]
    fn unparseable_values_fall_back_to_default() {
        assert_eq!(parse_env("AIRSALES_TEST_UNSET_VARIABLE", 42u32), 42);
    }
}
