//! Aggregate sales statistics.
//!
//! [`StatsRegister`] keeps revenue and clients-served as two independently
//! synchronised counters. A sale updates them as two separate atomic steps,
//! so a concurrent reader can observe the revenue of a sale before its
//! client count. That window is part of the observable behaviour: readers
//! get eventually-consistent pairs, never torn values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

/// A point-in-time copy of the sales totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesStat {
    /// Sum of all ticket prices sold
    pub total_revenue: i32,
    /// Number of clients who bought a ticket
    pub total_clients_served: i32,
}

impl SalesStat {
    /// Totals from raw values.
    #[must_use]
    pub const fn new(total_revenue: i32, total_clients_served: i32) -> Self {
        Self {
            total_revenue,
            total_clients_served,
        }
    }
}

impl fmt::Display for SalesStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "clients_served={}, revenue={}",
            self.total_clients_served, self.total_revenue
        )
    }
}

/// Thread-safe running totals, one instance per process.
///
/// On the Seller it is written by the workers; on the Manager it mirrors the
/// last snapshot read from shared memory.
#[derive(Debug, Default)]
pub struct StatsRegister {
    total_revenue: AtomicI32,
    total_clients_served: AtomicI32,
}

impl StatsRegister {
    /// Register with both totals at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_revenue: AtomicI32::new(0),
            total_clients_served: AtomicI32::new(0),
        }
    }

    /// Current revenue.
    #[must_use]
    pub fn total_revenue(&self) -> i32 {
        self.total_revenue.load(Ordering::SeqCst)
    }

    /// Current number of clients served.
    #[must_use]
    pub fn total_clients_served(&self) -> i32 {
        self.total_clients_served.load(Ordering::SeqCst)
    }

    /// Overwrite the revenue.
    pub fn set_total_revenue(&self, value: i32) {
        self.total_revenue.store(value, Ordering::SeqCst);
    }

    /// Overwrite the clients-served count.
    pub fn set_total_clients_served(&self, value: i32) {
        self.total_clients_served.store(value, Ordering::SeqCst);
    }

    /// Add `amount` to the revenue.
    pub fn add_revenue(&self, amount: i32) {
        self.total_revenue.fetch_add(amount, Ordering::SeqCst);
    }

    /// Count one more client served.
    pub fn add_client_served(&self) {
        self.total_clients_served.fetch_add(1, Ordering::SeqCst);
    }

    /// Record one sale of `cost`: revenue first, then the client count.
    pub fn record_sale(&self, cost: i32) {
        self.add_revenue(cost);
        self.add_client_served();
    }

    /// Read both totals (two independent loads).
    #[must_use]
    pub fn snapshot(&self) -> SalesStat {
        SalesStat {
            total_revenue: self.total_revenue(),
            total_clients_served: self.total_clients_served(),
        }
    }

    /// Mirror `stat` into this register (two independent stores).
    pub fn mirror(&self, stat: SalesStat) {
        self.set_total_revenue(stat.total_revenue);
        self.set_total_clients_served(stat.total_clients_served);
    }
}
