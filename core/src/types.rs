//! Identifiers and small value types shared by Seller and Manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Identifiers
// ============================================================================

/// Process-unique identifier of a client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(u64);

impl ClientId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a worker in the sales pool (1-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(usize);

impl WorkerId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    /// Raw id value.
    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a flight in the inventory's fixed enumeration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlightId(usize);

impl FlightId {
    /// Wrap a raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for FlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Clients
// ============================================================================

/// Monotonic id source for [`Client`]s.
///
/// Owned by whoever manufactures clients instead of living in a global, so
/// tests can start from a known value.
#[derive(Debug)]
pub struct ClientSequence {
    next: AtomicU64,
}

impl ClientSequence {
    /// Sequence whose first id is 1.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Sequence whose first id is `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Create the next client.
    pub fn next_client(&self) -> Client {
        let id = self.next.fetch_add(1, Ordering::SeqCst);
        Client { id: ClientId(id) }
    }
}

impl Default for ClientSequence {
    fn default() -> Self {
        Self::new()
    }
}

/// A customer waiting to buy one ticket. Immutable once created.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Client {
    id: ClientId,
}

impl Client {
    /// The client's id.
    #[must_use]
    pub const fn id(&self) -> ClientId {
        self.id
    }
}

// ============================================================================
// Seats
// ============================================================================

/// Cabin class of a seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeatClass {
    /// First class
    First,
    /// Economy class
    Economy,
}

impl SeatClass {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::First => "first_class",
            Self::Economy => "economy_class",
        }
    }
}

impl fmt::Display for SeatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "First class"),
            Self::Economy => write!(f, "Economy class"),
        }
    }
}

/// A successfully booked seat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Booking {
    /// Flight the seat belongs to
    pub flight: FlightId,
    /// Cabin class of the seat
    pub class: SeatClass,
    /// Ticket price charged
    pub cost: i32,
}
