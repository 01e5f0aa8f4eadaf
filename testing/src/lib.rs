//! # AirSales Testing
//!
//! Test doubles for the seams in `airsales-core` and helpers for fast,
//! isolated configurations.
//!
//! ## Example
//!
//! ```ignore
//! use airsales_testing::mocks::{InMemorySnapshotChannel, RecordingControlSender};
//!
//! let snapshots = Arc::new(InMemorySnapshotChannel::new());
//! let sender = Arc::new(RecordingControlSender::connected());
//!
//! arbiter.register(Arc::new(NotifyPeer::new(ProcessRole::Manager, sender.clone())));
//! snapshots.set(SalesStat::new(600_000, 900));
//! poller.tick();
//!
//! assert_eq!(sender.sent(), vec![ControlCode::WeAreTooRichNow]);
//! ```

/// In-memory implementations of the core seams.
pub mod mocks {
    use airsales_core::{
        ControlCode, ControlSendError, ControlSender, SalesStat, SharedSnapshot, SnapshotError,
        SnapshotPublisher, SnapshotSource, TerminationHandler, TerminationReason,
    };
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Mutex, PoisonError};

    /// Records every code instead of sending it.
    #[derive(Debug)]
    pub struct RecordingControlSender {
        sent: Mutex<Vec<ControlCode>>,
        connected: AtomicBool,
    }

    impl RecordingControlSender {
        /// Sender with a live peer.
        #[must_use]
        pub const fn connected() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                connected: AtomicBool::new(true),
            }
        }

        /// Sender with no peer; every send fails with `NotConnected`.
        #[must_use]
        pub const fn disconnected() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                connected: AtomicBool::new(false),
            }
        }

        /// Attach or detach the peer.
        pub fn set_connected(&self, connected: bool) {
            self.connected.store(connected, Ordering::SeqCst);
        }

        /// Codes sent so far, in order.
        #[must_use]
        pub fn sent(&self) -> Vec<ControlCode> {
            self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl ControlSender for RecordingControlSender {
        fn send(&self, code: ControlCode) -> Result<(), ControlSendError> {
            if !self.connected.load(Ordering::SeqCst) {
                return Err(ControlSendError::NotConnected);
            }
            self.sent
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(code);
            Ok(())
        }
    }

    /// A snapshot held in process memory, usable as both publisher and
    /// source. Stores the encoded bytes so the layout is exercised.
    #[derive(Debug, Default)]
    pub struct InMemorySnapshotChannel {
        snapshot: Mutex<SharedSnapshot>,
        publishes: AtomicUsize,
    }

    impl InMemorySnapshotChannel {
        /// Zeroed snapshot.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Overwrite the snapshot as the Seller would.
        pub fn set(&self, stat: SalesStat) {
            *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = SharedSnapshot::from_stat(stat);
        }

        /// Current snapshot.
        #[must_use]
        pub fn current(&self) -> SalesStat {
            self.snapshot.lock().unwrap_or_else(PoisonError::into_inner).to_stat()
        }

        /// Number of successful publishes.
        #[must_use]
        pub fn publish_count(&self) -> usize {
            self.publishes.load(Ordering::SeqCst)
        }
    }

    impl SnapshotPublisher for InMemorySnapshotChannel {
        fn publish(&self, stat: SalesStat) -> Result<(), SnapshotError> {
            self.set(stat);
            self.publishes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl SnapshotSource for InMemorySnapshotChannel {
        fn read(&self) -> Result<SalesStat, SnapshotError> {
            Ok(self.current())
        }
    }

    /// Fails the first `failures` calls with a lock timeout, then delegates
    /// to an inner [`InMemorySnapshotChannel`].
    #[derive(Debug)]
    pub struct FailingSnapshotSource {
        remaining_failures: AtomicUsize,
        inner: InMemorySnapshotChannel,
    }

    impl FailingSnapshotSource {
        /// Fail the next `failures` reads or writes.
        #[must_use]
        pub fn new(failures: usize) -> Self {
            Self {
                remaining_failures: AtomicUsize::new(failures),
                inner: InMemorySnapshotChannel::new(),
            }
        }

        /// The snapshot served once the failures are used up.
        #[must_use]
        pub const fn inner(&self) -> &InMemorySnapshotChannel {
            &self.inner
        }

        fn fail_now(&self) -> bool {
            self.remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl SnapshotSource for FailingSnapshotSource {
        fn read(&self) -> Result<SalesStat, SnapshotError> {
            if self.fail_now() {
                return Err(SnapshotError::LockTimeout);
            }
            self.inner.read()
        }
    }

    impl SnapshotPublisher for FailingSnapshotSource {
        fn publish(&self, stat: SalesStat) -> Result<(), SnapshotError> {
            if self.fail_now() {
                return Err(SnapshotError::LockTimeout);
            }
            self.inner.publish(stat)
        }
    }

    /// Records every reason it is invoked with.
    #[derive(Debug, Default)]
    pub struct RecordingTerminationHandler {
        reasons: Mutex<Vec<TerminationReason>>,
    }

    impl RecordingTerminationHandler {
        /// Empty record.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Reasons seen, in order.
        #[must_use]
        pub fn reasons(&self) -> Vec<TerminationReason> {
            self.reasons.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    impl TerminationHandler for RecordingTerminationHandler {
        fn name(&self) -> &str {
            "recording"
        }

        fn on_terminate(&self, reason: TerminationReason) -> Result<(), String> {
            self.reasons
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(reason);
            Ok(())
        }
    }
}

/// Configurations and setup for tests.
pub mod helpers {
    use airsales_core::{IpcConfig, ManagerConfig, SellerConfig};
    use std::path::Path;

    /// Shared names in `dir`, an ephemeral control port and a short lock
    /// timeout.
    #[must_use]
    pub fn ipc_config(dir: &Path) -> IpcConfig {
        IpcConfig {
            control_addr: "127.0.0.1:0".to_string(),
            shared_name: "AirSalesTest".to_string(),
            shm_dir: dir.to_path_buf(),
            segment_size: 64,
            lock_timeout_ms: 200,
        }
    }

    /// A small, fast Seller: `flights` flights of `seats` economy seats, no
    /// first class, two workers, clients every 1-2ms.
    #[must_use]
    pub fn seller_config(dir: &Path, flights: usize, seats: u32) -> SellerConfig {
        SellerConfig {
            ipc: ipc_config(dir),
            flights,
            first_class_seats: 0,
            economy_seats: seats,
            workers: 2,
            worker_poll_ms: 1,
            client_interval_min_ms: 1,
            client_interval_max_ms: 2,
            ..SellerConfig::default()
        }
    }

    /// A fast Manager attached to the Seller at `control_addr`: no startup
    /// delay, 20ms polls, and a departure far enough away not to interfere.
    #[must_use]
    pub fn manager_config(dir: &Path, control_addr: &str) -> ManagerConfig {
        ManagerConfig {
            ipc: IpcConfig {
                control_addr: control_addr.to_string(),
                ..ipc_config(dir)
            },
            poll_interval_ms: 20,
            departure_secs: 60,
            startup_delay_ms: 0,
            connect_retries: 2,
            ..ManagerConfig::default()
        }
    }

    /// Install a `tracing` subscriber honouring `RUST_LOG`, once per test
    /// binary.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}

pub use helpers::{init_tracing, ipc_config, manager_config, seller_config};
pub use mocks::{
    FailingSnapshotSource, InMemorySnapshotChannel, RecordingControlSender,
    RecordingTerminationHandler,
};
