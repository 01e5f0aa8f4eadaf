//! Seat inventory for the Seller.
//!
//! Every flight holds two independent seat counters. Booking is atomic with
//! respect to concurrent bookers: all flights of one [`SeatInventory`] share a
//! single lock, so seat counts can never go negative and a seat is never sold
//! twice.
//!
//! **Allocation policy** (per flight):
//!
//! 1. Both classes sold out: fail.
//! 2. Only one class has supply: book that class.
//! 3. Both have supply: a fair coin picks the class.
//!
//! Clients are offered flights in the inventory's fixed order; the first
//! flight that can seat them wins. When no flight can, the inventory is
//! exhausted and the Seller terminates with `SoldOut`.

use crate::types::{Booking, FlightId, SeatClass};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};

/// Ticket prices per cabin class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatPricing {
    /// Price of a first-class ticket
    pub first_class: i32,
    /// Price of an economy ticket
    pub economy: i32,
}

impl SeatPricing {
    /// Price for `class`.
    #[must_use]
    pub const fn price(&self, class: SeatClass) -> i32 {
        match class {
            SeatClass::First => self.first_class,
            SeatClass::Economy => self.economy,
        }
    }
}

impl Default for SeatPricing {
    fn default() -> Self {
        Self {
            first_class: 800,
            economy: 300,
        }
    }
}

/// Seat counters of one flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Flight {
    first_class_seats: u32,
    economy_seats: u32,
}

impl Flight {
    /// Flight with the given seat supply.
    #[must_use]
    pub const fn new(first_class_seats: u32, economy_seats: u32) -> Self {
        Self {
            first_class_seats,
            economy_seats,
        }
    }

    /// Seats left in `class`.
    #[must_use]
    pub const fn remaining(&self, class: SeatClass) -> u32 {
        match class {
            SeatClass::First => self.first_class_seats,
            SeatClass::Economy => self.economy_seats,
        }
    }

    /// Seats left in both classes.
    #[must_use]
    pub fn total_remaining(&self) -> u64 {
        u64::from(self.first_class_seats) + u64::from(self.economy_seats)
    }

    /// True once both classes are empty.
    #[must_use]
    pub const fn is_sold_out(&self) -> bool {
        self.first_class_seats == 0 && self.economy_seats == 0
    }

    /// Book one seat, using `prefer_first` as the coin flip when both classes
    /// have supply.
    ///
    /// Returns the booked class, or `None` when the flight is sold out.
    pub fn try_book(&mut self, prefer_first: bool) -> Option<SeatClass> {
        let class = match (self.first_class_seats > 0, self.economy_seats > 0) {
            (false, false) => return None,
            (true, false) => SeatClass::First,
            (false, true) => SeatClass::Economy,
            (true, true) if prefer_first => SeatClass::First,
            (true, true) => SeatClass::Economy,
        };

        match class {
            SeatClass::First => self.first_class_seats -= 1,
            SeatClass::Economy => self.economy_seats -= 1,
        }

        Some(class)
    }
}

/// A fixed set of flights sharing one booking lock.
#[derive(Debug)]
pub struct SeatInventory {
    flights: Mutex<Vec<Flight>>,
    pricing: SeatPricing,
}

impl SeatInventory {
    /// Inventory over the given flights, offered in this order.
    #[must_use]
    pub const fn new(flights: Vec<Flight>, pricing: SeatPricing) -> Self {
        Self {
            flights: Mutex::new(flights),
            pricing,
        }
    }

    /// `count` identical flights.
    #[must_use]
    pub fn uniform(count: usize, first_class_seats: u32, economy_seats: u32, pricing: SeatPricing) -> Self {
        Self::new(vec![Flight::new(first_class_seats, economy_seats); count], pricing)
    }

    /// Prices used for bookings.
    #[must_use]
    pub const fn pricing(&self) -> SeatPricing {
        self.pricing
    }

    /// Seats left across all flights.
    #[must_use]
    pub fn total_remaining(&self) -> u64 {
        self.lock()
            .iter()
            .fold(0, |total: u64, flight| total.saturating_add(flight.total_remaining()))
    }

    /// True once every flight is sold out.
    #[must_use]
    pub fn is_sold_out(&self) -> bool {
        self.lock().iter().all(Flight::is_sold_out)
    }

    /// Offer a seat on each flight in order and keep the first that succeeds.
    ///
    /// `None` means every flight is sold out.
    pub fn book_first_available(&self) -> Option<Booking> {
        let mut rng = rand::thread_rng();
        self.book_first_available_with(|| rng.gen_bool(0.5))
    }

    /// Same as [`Self::book_first_available`], drawing one coin per flight
    /// attempt from `coin`.
    pub fn book_first_available_with(&self, mut coin: impl FnMut() -> bool) -> Option<Booking> {
        let mut flights = self.lock();
        flights.iter_mut().enumerate().find_map(|(index, flight)| {
            flight
                .try_book(coin())
                .map(|class| self.booking(FlightId::new(index), class))
        })
    }

    const fn booking(&self, flight: FlightId, class: SeatClass) -> Booking {
        Booking {
            flight,
            class,
            cost: self.pricing.price(class),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Flight>> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
