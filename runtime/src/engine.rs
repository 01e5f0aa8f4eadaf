//! The Seller's sales pipeline: one [`SalesEngine`] shared by a
//! [`WorkerPool`] of OS threads.
//!
//! Each worker polls the [`ClientQueue`], backing off for a fixed interval
//! when it is empty, so every worker observes cancellation within one poll
//! interval. A client no flight can seat ends the run with
//! [`TerminationReason::SoldOut`].

use crate::error::RuntimeError;
use crate::metrics::{IpcMetrics, SalesMetrics};
use crate::queue::ClientQueue;
use airsales_core::{
    Booking, Client, SeatInventory, SnapshotPublisher, StatsRegister, TerminationArbiter,
    TerminationReason, WorkerId,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Books seats for clients and publishes the resulting totals.
pub struct SalesEngine {
    inventory: Arc<SeatInventory>,
    stats: Arc<StatsRegister>,
    publisher: Arc<dyn SnapshotPublisher>,
    arbiter: Arc<TerminationArbiter>,
}

impl SalesEngine {
    /// Engine over the given collaborators.
    #[must_use]
    pub fn new(
        inventory: Arc<SeatInventory>,
        stats: Arc<StatsRegister>,
        publisher: Arc<dyn SnapshotPublisher>,
        arbiter: Arc<TerminationArbiter>,
    ) -> Self {
        Self {
            inventory,
            stats,
            publisher,
            arbiter,
        }
    }

    /// True once the Seller has been told to stop.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.arbiter.is_cancelled()
    }

    /// Sell `client` one seat on the first flight that has one.
    ///
    /// On success the sale is recorded and published; a failed publish is
    /// logged and does not undo the sale. Returns `None` when every flight
    /// is sold out, after triggering the `SoldOut` termination.
    pub fn serve(&self, worker: WorkerId, client: Client) -> Option<Booking> {
        let Some(booking) = self.inventory.book_first_available() else {
            info!(%worker, client = %client.id(), "No flight can seat client");
            self.arbiter.terminate(TerminationReason::SoldOut);
            return None;
        };

        self.stats.record_sale(booking.cost);
        SalesMetrics::record_sale(booking.class);

        let stat = self.stats.snapshot();
        SalesMetrics::record_stats(stat);
        match self.publisher.publish(stat) {
            Ok(()) => IpcMetrics::record_publish(),
            Err(e) => {
                IpcMetrics::record_publish_failure();
                warn!(%worker, error = %e, "Failed to publish sales snapshot");
            }
        }

        debug!(
            %worker,
            client = %client.id(),
            flight = %booking.flight,
            class = %booking.class,
            cost = booking.cost,
            "[{worker}] sold {} to [{}]",
            booking.class,
            client.id()
        );
        Some(booking)
    }
}

impl std::fmt::Debug for SalesEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalesEngine")
            .field("inventory", &self.inventory)
            .field("stats", &self.stats)
            .field("arbiter", &self.arbiter)
            .finish_non_exhaustive()
    }
}

/// What one worker did before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerReport {
    /// Worker id
    pub worker: WorkerId,
    /// Clients this worker sold a ticket to
    pub served: u64,
}

/// Fixed set of worker threads draining one queue.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<(WorkerId, JoinHandle<WorkerReport>)>,
}

impl WorkerPool {
    /// Start `count` workers, numbered from 1.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::WorkerSpawn`] if a thread cannot be started.
    /// Workers already running are cancelled and joined first.
    pub fn spawn(
        count: usize,
        engine: &Arc<SalesEngine>,
        queue: &ClientQueue,
        poll_interval: Duration,
    ) -> Result<Self, RuntimeError> {
        let mut pool = Self {
            workers: Vec::with_capacity(count),
        };

        for n in 1..=count {
            let worker = WorkerId::new(n);
            let engine_for_worker = Arc::clone(engine);
            let queue = queue.clone();

            let spawned = thread::Builder::new()
                .name(format!("worker-{n}"))
                .spawn(move || run_worker(worker, &engine_for_worker, &queue, poll_interval));

            match spawned {
                Ok(handle) => pool.workers.push((worker, handle)),
                Err(source) => {
                    engine.arbiter.cancel();
                    let _ = pool.join();
                    return Err(RuntimeError::WorkerSpawn { worker: n, source });
                }
            }
        }

        info!(workers = count, "Worker pool started");
        Ok(pool)
    }

    /// Number of workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// True for a pool without workers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Wait for every worker to stop.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::WorkerPanicked`] for the first worker that
    /// panicked; the others are still joined.
    pub fn join(self) -> Result<Vec<WorkerReport>, RuntimeError> {
        let mut reports = Vec::with_capacity(self.workers.len());
        let mut first_panic = None;

        for (worker, handle) in self.workers {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(_) => {
                    warn!(%worker, "Worker panicked");
                    first_panic.get_or_insert(worker.value());
                }
            }
        }

        match first_panic {
            Some(worker) => Err(RuntimeError::WorkerPanicked(worker)),
            None => Ok(reports),
        }
    }
}

fn run_worker(worker: WorkerId, engine: &SalesEngine, queue: &ClientQueue, poll_interval: Duration) -> WorkerReport {
    debug!(%worker, "Worker started");
    let mut served = 0;

    while !engine.is_stopped() {
        match queue.try_pop() {
            Some(client) => {
                if engine.serve(worker, client).is_none() {
                    break;
                }
                served += 1;
            }
            None => thread::sleep(poll_interval),
        }
    }

    debug!(%worker, served, "Worker stopped");
    WorkerReport { worker, served }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airsales_core::{ClientSequence, Flight, ProcessRole, SalesStat, SeatPricing, SnapshotError};
    use std::sync::{Mutex, PoisonError};

    #[derive(Default)]
    struct LastPublished(Mutex<Option<SalesStat>>);

    impl SnapshotPublisher for LastPublished {
        fn publish(&self, stat: SalesStat) -> Result<(), SnapshotError> {
            *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(stat);
            Ok(())
        }
    }

    struct BrokenPublisher;

    impl SnapshotPublisher for BrokenPublisher {
        fn publish(&self, _stat: SalesStat) -> Result<(), SnapshotError> {
            Err(SnapshotError::LockTimeout)
        }
    }

    fn engine(seats: u32, publisher: Arc<dyn SnapshotPublisher>) -> (SalesEngine, Arc<StatsRegister>, Arc<TerminationArbiter>) {
        let stats = Arc::new(StatsRegister::new());
        let arbiter = Arc::new(TerminationArbiter::new(ProcessRole::Seller));
        let inventory = Arc::new(SeatInventory::new(vec![Flight::new(0, seats)], SeatPricing::default()));
        let engine = SalesEngine::new(inventory, Arc::clone(&stats), publisher, Arc::clone(&arbiter));
        (engine, stats, arbiter)
    }

    #[test]
    fn sale_updates_stats_and_publishes() {
        let published = Arc::new(LastPublished::default());
        let (engine, stats, _) = engine(2, published.clone());
        let client = ClientSequence::new().next_client();

        let booking = engine.serve(WorkerId::new(1), client);

        assert_eq!(booking.map(|b| b.cost), Some(300));
        assert_eq!(stats.snapshot(), SalesStat::new(300, 1));
        assert_eq!(*published.0.lock().unwrap(), Some(SalesStat::new(300, 1)));
    }

    #[test]
    fn publish_failure_keeps_the_sale() {
        let (engine, stats, arbiter) = engine(1, Arc::new(BrokenPublisher));

        assert!(engine.serve(WorkerId::new(1), ClientSequence::new().next_client()).is_some());
        assert_eq!(stats.total_clients_served(), 1);
        assert!(!arbiter.is_terminated());
    }

    #[test]
    fn unsellable_client_terminates_sold_out() {
        let (engine, stats, arbiter) = engine(0, Arc::new(LastPublished::default()));

        assert!(engine.serve(WorkerId::new(3), ClientSequence::new().next_client()).is_none());
        assert_eq!(arbiter.reason(), Some(TerminationReason::SoldOut));
        assert!(engine.is_stopped());
        assert_eq!(stats.snapshot(), SalesStat::default());
    }

    #[test]
    fn pool_drains_queue_then_stops_on_sold_out() {
        let (engine, stats, arbiter) = engine(10, Arc::new(LastPublished::default()));
        let engine = Arc::new(engine);
        let queue = ClientQueue::new();
        let sequence = ClientSequence::new();
        for _ in 0..11 {
            queue.push(sequence.next_client());
        }

        let pool = WorkerPool::spawn(3, &engine, &queue, Duration::from_millis(1)).unwrap();
        assert_eq!(pool.len(), 3);
        let reports = pool.join().unwrap();

        assert_eq!(reports.iter().map(|r| r.served).sum::<u64>(), 10);
        assert_eq!(stats.snapshot(), SalesStat::new(3000, 10));
        assert_eq!(arbiter.reason(), Some(TerminationReason::SoldOut));
    }

    #[test]
    fn idle_workers_observe_cancellation() {
        let (engine, _, arbiter) = engine(10, Arc::new(LastPublished::default()));
        let engine = Arc::new(engine);

        let pool = WorkerPool::spawn(2, &engine, &ClientQueue::new(), Duration::from_millis(1)).unwrap();
        arbiter.cancel();
        let reports = pool.join().unwrap();

        assert!(reports.iter().all(|r| r.served == 0));
        assert!(!arbiter.is_terminated());
    }
}
