//! The Manager (controller) process.
//!
//! The Manager never sells anything. It watches the Seller through the
//! shared snapshot and can end the run for three reasons:
//!
//! - [`StatsPoller`]: the mirrored revenue reached the threshold (`TooRich`)
//! - [`DepartureTimer`]: the departure time elapsed (`Departure`)
//! - the Seller reported `AllFlightsSoldOut` (`SoldOut`)
//!
//! Whichever wins, the Manager stops its timers, and for its own decisions
//! tells the Seller once.

use crate::error::RuntimeError;
use crate::metrics::{IpcMetrics, SalesMetrics};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::signals::{NotifyPeer, RecordTermination, TerminateOnControlCode};
use airsales_core::{
    ManagerConfig, ProcessRole, SalesStat, SnapshotSource, StatsRegister, TerminationArbiter,
    TerminationReason,
};
use airsales_ipc::{
    ControlClient, ControlConnection, ControlHandler, ControlLink, SharedMemoryChannel,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Mirrors the shared snapshot and enforces the revenue threshold.
pub struct StatsPoller {
    source: Arc<dyn SnapshotSource>,
    mirror: Arc<StatsRegister>,
    revenue_threshold: i32,
    arbiter: Arc<TerminationArbiter>,
}

impl StatsPoller {
    /// Poller reading from `source` into `mirror`.
    #[must_use]
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        mirror: Arc<StatsRegister>,
        revenue_threshold: i32,
        arbiter: Arc<TerminationArbiter>,
    ) -> Self {
        Self {
            source,
            mirror,
            revenue_threshold,
            arbiter,
        }
    }

    /// Read the snapshot once.
    ///
    /// A failed read is logged and skipped. Reaching the threshold triggers
    /// `TooRich`; the arbiter makes repeats no-ops.
    pub fn tick(&self) -> Option<SalesStat> {
        let stat = match self.source.read() {
            Ok(stat) => stat,
            Err(e) => {
                IpcMetrics::record_poll_failure();
                warn!(error = %e, "Failed to read sales snapshot, skipping tick");
                return None;
            }
        };

        IpcMetrics::record_poll();
        self.mirror.mirror(stat);
        SalesMetrics::record_stats(stat);
        info!(%stat, "Sales statistics");

        if stat.total_revenue >= self.revenue_threshold {
            self.arbiter.terminate(TerminationReason::TooRich);
        }
        Some(stat)
    }

    /// Tick every `period` until the Manager is cancelled. The first read
    /// happens one period after start.
    ///
    /// Each read waits on the cross-process lock, so it runs on the
    /// blocking pool.
    pub fn spawn(self, period: Duration) -> JoinHandle<()> {
        let poller = Arc::new(self);
        tokio::spawn(async move {
            let mut cancelled = poller.arbiter.subscribe();
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            while !*cancelled.borrow() {
                tokio::select! {
                    _ = ticker.tick() => {
                        let poller = Arc::clone(&poller);
                        if let Err(e) = tokio::task::spawn_blocking(move || poller.tick()).await {
                            warn!(error = %e, "Snapshot poll task failed");
                        }
                    }
                    changed = cancelled.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for StatsPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsPoller")
            .field("mirror", &self.mirror)
            .field("revenue_threshold", &self.revenue_threshold)
            .finish_non_exhaustive()
    }
}

/// One-shot timer ending the run with `Departure`.
#[derive(Debug)]
pub struct DepartureTimer {
    after: Duration,
    arbiter: Arc<TerminationArbiter>,
}

impl DepartureTimer {
    /// Timer firing `after` it is spawned.
    #[must_use]
    pub const fn new(after: Duration, arbiter: Arc<TerminationArbiter>) -> Self {
        Self { after, arbiter }
    }

    /// Run the timer; cancellation stops it without firing.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(self.after) => {
                    self.arbiter.terminate(TerminationReason::Departure);
                }
                () = self.arbiter.cancelled() => {}
            }
        })
    }
}

/// A started Manager, attached to the Seller and ready to
/// [`run`](Self::run).
#[derive(Debug)]
pub struct ManagerProcess {
    config: ManagerConfig,
    arbiter: Arc<TerminationArbiter>,
    mirror: Arc<StatsRegister>,
    channel: Arc<SharedMemoryChannel>,
    connection: ControlConnection,
}

impl ManagerProcess {
    /// Wait the readiness delay, attach to the Seller's shared memory and
    /// connect to its control listener.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Ipc`] if the shared objects do not exist or
    /// the connection still fails after every retry.
    pub async fn start(config: ManagerConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        if !config.startup_delay().is_zero() {
            info!(delay_ms = config.startup_delay_ms, "Waiting for seller to start");
            tokio::time::sleep(config.startup_delay()).await;
        }

        let channel = Arc::new(SharedMemoryChannel::open_existing(&config.ipc)?);

        // Handlers go in before the reader task can deliver a code.
        let arbiter = Arc::new(TerminationArbiter::new(ProcessRole::Manager));
        let link = ControlLink::new();
        arbiter.register(Arc::new(RecordTermination));
        arbiter.register(Arc::new(NotifyPeer::new(
            ProcessRole::Manager,
            Arc::new(link.clone()),
        )));
        let handler: Arc<dyn ControlHandler> = Arc::new(TerminateOnControlCode::new(Arc::clone(&arbiter)));

        let policy = RetryPolicy::builder().max_retries(config.connect_retries).build();
        let addr = config.ipc.control_addr.as_str();
        let connection = retry_with_backoff(policy, "connect to seller", || {
            ControlClient::connect_with_link(addr, link.clone(), Arc::clone(&handler))
        })
        .await?;

        Ok(Self {
            config,
            arbiter,
            mirror: Arc::new(StatsRegister::new()),
            channel,
            connection,
        })
    }

    /// The Manager's termination arbiter.
    #[must_use]
    pub fn arbiter(&self) -> Arc<TerminationArbiter> {
        Arc::clone(&self.arbiter)
    }

    /// Watch the Seller until terminated or cancelled and return the last
    /// mirrored totals.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Task`] if a timer task fails.
    pub async fn run(self) -> Result<SalesStat, RuntimeError> {
        let source: Arc<dyn SnapshotSource> = self.channel.clone();
        let poller = StatsPoller::new(
            source,
            Arc::clone(&self.mirror),
            self.config.revenue_threshold,
            Arc::clone(&self.arbiter),
        )
        .spawn(self.config.poll_interval());
        let departure = DepartureTimer::new(self.config.departure_after(), Arc::clone(&self.arbiter)).spawn();

        info!(
            departure_secs = self.config.departure_secs,
            revenue_threshold = self.config.revenue_threshold,
            "Watching sales"
        );

        self.arbiter.cancelled().await;

        let timers = tokio::try_join!(poller, departure);
        self.connection.close(FLUSH_TIMEOUT).await;

        let stat = self.mirror.snapshot();
        info!(%stat, reason = ?self.arbiter.reason(), "Final sales statistics");

        timers.map_err(|e| RuntimeError::Task(e.to_string()))?;
        Ok(stat)
    }
}
