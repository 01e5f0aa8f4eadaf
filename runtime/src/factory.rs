//! Timer-driven source of synthetic clients.
//!
//! The inter-arrival interval is drawn once, uniformly from the configured
//! range, and then held for the whole run.

use crate::metrics::SalesMetrics;
use crate::queue::ClientQueue;
use airsales_core::{Client, ClientSequence};
use rand::Rng;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Produces one client per tick into a [`ClientQueue`].
#[derive(Debug)]
pub struct ClientFactory {
    sequence: Arc<ClientSequence>,
    queue: ClientQueue,
    interval: Duration,
}

impl ClientFactory {
    /// Factory with an interval drawn from `range_ms` (milliseconds,
    /// end exclusive).
    ///
    /// An empty range falls back to its start.
    #[must_use]
    pub fn new(sequence: Arc<ClientSequence>, queue: ClientQueue, range_ms: Range<u64>) -> Self {
        let millis = if range_ms.is_empty() {
            range_ms.start
        } else {
            rand::thread_rng().gen_range(range_ms)
        };
        Self::with_interval(sequence, queue, Duration::from_millis(millis.max(1)))
    }

    /// Factory with a fixed interval.
    #[must_use]
    pub const fn with_interval(sequence: Arc<ClientSequence>, queue: ClientQueue, interval: Duration) -> Self {
        Self {
            sequence,
            queue,
            interval,
        }
    }

    /// Inter-arrival interval for this run.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Manufacture and enqueue one client.
    pub fn produce(&self) -> Client {
        let client = self.sequence.next_client();
        self.queue.push(client);
        SalesMetrics::record_client_created();
        debug!(client = %client.id(), "Client arrived");
        client
    }

    /// Tick until `cancelled` turns `true`. Resolves to the number of
    /// clients produced.
    pub fn spawn(self, mut cancelled: watch::Receiver<bool>) -> JoinHandle<u64> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; arrivals start one
            // interval in.
            ticker.tick().await;

            info!(interval_ms = self.interval.as_millis(), "Client factory started");
            let mut produced = 0u64;

            while !*cancelled.borrow() {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.produce();
                        produced += 1;
                    }
                    changed = cancelled.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            info!(produced, "Client factory stopped");
            produced
        })
    }
}
