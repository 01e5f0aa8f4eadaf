//! The Seller process.
//!
//! Lifecycle:
//!
//! 1. create the shared segment and mutex (snapshot zeroed)
//! 2. bind the control listener
//! 3. wait for a Manager to connect
//! 4. run the [`ClientFactory`] and [`WorkerPool`] until termination
//! 5. flush pending control codes, join the workers, report the totals
//!
//! The shared objects are removed when the process value is dropped.

use crate::engine::{SalesEngine, WorkerPool};
use crate::error::RuntimeError;
use crate::factory::ClientFactory;
use crate::queue::ClientQueue;
use crate::signals::{NotifyPeer, RecordTermination, TerminateOnControlCode};
use airsales_core::{
    ClientSequence, ProcessRole, SalesStat, SeatInventory, SellerConfig, SnapshotPublisher,
    StatsRegister, TerminationArbiter,
};
use airsales_ipc::{ControlLink, ControlServer, ControlServerHandle, SharedMemoryChannel};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// A started Seller, ready to [`run`](Self::run).
#[derive(Debug)]
pub struct SellerProcess {
    config: SellerConfig,
    arbiter: Arc<TerminationArbiter>,
    stats: Arc<StatsRegister>,
    inventory: Arc<SeatInventory>,
    channel: Arc<SharedMemoryChannel>,
    server: ControlServerHandle,
    control_addr: SocketAddr,
}

impl SellerProcess {
    /// Create the shared objects and start listening for the Manager.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] for an invalid configuration, or
    /// [`RuntimeError::Ipc`] if the shared objects cannot be created or the
    /// listener cannot be bound.
    pub async fn start(config: SellerConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        let arbiter = Arc::new(TerminationArbiter::new(ProcessRole::Seller));
        let stats = Arc::new(StatsRegister::new());
        let inventory = Arc::new(SeatInventory::uniform(
            config.flights,
            config.first_class_seats,
            config.economy_seats,
            config.pricing,
        ));
        info!(
            flights = config.flights,
            seats = inventory.total_remaining(),
            "Inventory ready"
        );

        let channel = Arc::new(SharedMemoryChannel::create(&config.ipc)?);

        let server = ControlServer::bind(&config.ipc.control_addr).await?;
        let control_addr = server.local_addr()?;
        let link: ControlLink = server.link();

        arbiter.register(Arc::new(RecordTermination));
        arbiter.register(Arc::new(NotifyPeer::new(ProcessRole::Seller, Arc::new(link))));
        let server = server.spawn(Arc::new(TerminateOnControlCode::new(Arc::clone(&arbiter))));

        Ok(Self {
            config,
            arbiter,
            stats,
            inventory,
            channel,
            server,
            control_addr,
        })
    }

    /// Bound control address.
    #[must_use]
    pub const fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// The Seller's termination arbiter.
    #[must_use]
    pub fn arbiter(&self) -> Arc<TerminationArbiter> {
        Arc::clone(&self.arbiter)
    }

    /// The Seller's running totals.
    #[must_use]
    pub fn stats(&self) -> Arc<StatsRegister> {
        Arc::clone(&self.stats)
    }

    /// Sell until terminated or cancelled and return the final totals.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] if the worker pool cannot start or a worker
    /// panics.
    pub async fn run(self) -> Result<SalesStat, RuntimeError> {
        let link = self.server.link();

        info!(addr = %self.control_addr, "Waiting for manager to connect");
        let connected = tokio::select! {
            () = link.wait_connected() => true,
            () = self.arbiter.cancelled() => false,
        };
        if !connected {
            info!("Stopped before a manager connected");
            return Ok(self.finish().await);
        }

        let queue = ClientQueue::new();
        let factory = ClientFactory::new(
            Arc::new(ClientSequence::new()),
            queue.clone(),
            self.config.client_interval_min_ms..self.config.client_interval_max_ms,
        );
        let factory = factory.spawn(self.arbiter.subscribe());

        let publisher: Arc<dyn SnapshotPublisher> = self.channel.clone();
        let engine = Arc::new(SalesEngine::new(
            Arc::clone(&self.inventory),
            Arc::clone(&self.stats),
            publisher,
            Arc::clone(&self.arbiter),
        ));
        let pool = match WorkerPool::spawn(
            self.config.workers,
            &engine,
            &queue,
            self.config.worker_poll_interval(),
        ) {
            Ok(pool) => pool,
            Err(e) => {
                factory.abort();
                self.finish().await;
                return Err(e);
            }
        };

        self.arbiter.cancelled().await;

        let joined = tokio::task::spawn_blocking(move || pool.join()).await;
        let produced = factory.await.unwrap_or_default();
        info!(produced, unserved = queue.len(), "Sales stopped");

        let stat = self.finish().await;
        let reports = joined.map_err(|e| RuntimeError::Task(e.to_string()))??;
        for report in reports {
            info!(worker = %report.worker, served = report.served, "Worker summary");
        }

        Ok(stat)
    }

    async fn finish(self) -> SalesStat {
        self.server.shutdown(FLUSH_TIMEOUT).await;

        let stat = self.stats.snapshot();
        info!(
            %stat,
            seats_left = self.inventory.total_remaining(),
            reason = ?self.arbiter.reason(),
            "Final sales statistics"
        );
        stat
    }
}
