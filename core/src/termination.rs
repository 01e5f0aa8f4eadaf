//! At-most-once termination for one process.
//!
//! Several independent triggers can end a run: a worker that cannot seat a
//! client, a control code from the other process, a local timer or threshold
//! check. They may fire concurrently. The [`TerminationArbiter`] makes the
//! first caller the only winner:
//!
//! - the check-and-set of the terminal reason happens under one lock
//! - the winner fires the process-wide cancellation signal, logs the terminal
//!   reason, and runs every registered [`TerminationHandler`] exactly once
//! - every other caller, concurrent or later, is a no-op
//!
//! ## Usage
//!
//! ```ignore
//! let arbiter = Arc::new(TerminationArbiter::new(ProcessRole::Seller));
//! arbiter.register(Arc::new(NotifyManagerOnSoldOut::new(link)));
//!
//! let mut cancelled = arbiter.subscribe();
//! // ... workers poll `*cancelled.borrow()` ...
//!
//! arbiter.terminate(TerminationReason::SoldOut); // true: we won
//! arbiter.terminate(TerminationReason::Departure); // false: no-op
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, error, info, trace};

/// Why a process stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminationReason {
    /// The departure timer elapsed
    Departure,
    /// Revenue reached the threshold
    TooRich,
    /// No flight could seat a client
    SoldOut,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Departure => write!(f, "departure"),
            Self::TooRich => write!(f, "too_rich"),
            Self::SoldOut => write!(f, "sold_out"),
        }
    }
}

/// Which process an arbiter belongs to. Only affects the terminal log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessRole {
    /// The process selling tickets
    Seller,
    /// The process watching the sales
    Manager,
}

impl ProcessRole {
    /// Terminal announcement for `reason`.
    #[must_use]
    pub const fn announcement(self, reason: TerminationReason) -> &'static str {
        match (self, reason) {
            (Self::Seller, TerminationReason::Departure) => "END OF SALES: DEPARTURE",
            (Self::Seller, TerminationReason::TooRich) => "END OF SALES: WE ARE TOO RICH NOW",
            (Self::Seller, TerminationReason::SoldOut) => "END OF SALES: OUT SOLD FLIGHTS ALL",
            (Self::Manager, TerminationReason::Departure) => "END OF PROGRAM: DEPARTURE",
            (Self::Manager, TerminationReason::TooRich) => "END OF PROGRAM: WE ARE TOO RICH NOW",
            (Self::Manager, TerminationReason::SoldOut) => "END OF PROGRAM: ALL FLIGHTS SOLD OUT",
        }
    }
}

/// A side effect that runs once, on the winning termination.
///
/// Implement this for anything that has to react to the end of the run:
/// notifying the other process, recording metrics, releasing resources.
/// Handlers run on the thread of the winning caller, in registration order,
/// and must not block.
pub trait TerminationHandler: Send + Sync {
    /// Component name for logging
    fn name(&self) -> &str;

    /// React to the terminal `reason`.
    ///
    /// # Errors
    ///
    /// Returns an error description if the side effect failed; the arbiter
    /// logs it and still runs the remaining handlers.
    fn on_terminate(&self, reason: TerminationReason) -> Result<(), String>;
}

/// Termination handler built from a closure.
///
/// # Example
///
/// ```ignore
/// arbiter.register(Arc::new(FnTerminationHandler::new("stop-timers", |_| {
///     timers.stop();
///     Ok(())
/// })));
/// ```
pub struct FnTerminationHandler {
    name: String,
    on_terminate: Box<dyn Fn(TerminationReason) -> Result<(), String> + Send + Sync>,
}

impl FnTerminationHandler {
    /// Wrap `on_terminate` under `name`.
    pub fn new<F>(name: impl Into<String>, on_terminate: F) -> Self
    where
        F: Fn(TerminationReason) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            on_terminate: Box::new(on_terminate),
        }
    }
}

impl TerminationHandler for FnTerminationHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_terminate(&self, reason: TerminationReason) -> Result<(), String> {
        (self.on_terminate)(reason)
    }
}

/// Guarded one-shot termination flag with its cancellation signal.
pub struct TerminationArbiter {
    role: ProcessRole,
    outcome: Mutex<Option<TerminationReason>>,
    handlers: Mutex<Vec<Arc<dyn TerminationHandler>>>,
    cancelled: watch::Sender<bool>,
}

impl TerminationArbiter {
    /// Arbiter for a process playing `role`.
    #[must_use]
    pub fn new(role: ProcessRole) -> Self {
        let (cancelled, _) = watch::channel(false);

        Self {
            role,
            outcome: Mutex::new(None),
            handlers: Mutex::new(Vec::new()),
            cancelled,
        }
    }

    /// The process role this arbiter announces for.
    #[must_use]
    pub const fn role(&self) -> ProcessRole {
        self.role
    }

    /// Register a handler to run on the winning termination.
    ///
    /// Handlers registered after termination never run.
    pub fn register(&self, handler: Arc<dyn TerminationHandler>) {
        debug!(handler = handler.name(), "Registered termination handler");
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Receiver of the process-wide cancellation signal (`true` once set).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancelled.subscribe()
    }

    /// True once the cancellation signal has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// The winning reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<TerminationReason> {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True once a reason has won.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.reason().is_some()
    }

    /// End the run for `reason`.
    ///
    /// Returns `true` for the single winning caller, which also performed
    /// the side effects; `false` for every other caller.
    pub fn terminate(&self, reason: TerminationReason) -> bool {
        {
            let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(winner) = *outcome {
                trace!(%reason, %winner, "Termination already decided, ignoring");
                return false;
            }
            *outcome = Some(reason);
        }

        self.cancelled.send_replace(true);
        info!(%reason, "{}", self.role.announcement(reason));

        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for handler in handlers {
            if let Err(e) = handler.on_terminate(reason) {
                error!(handler = handler.name(), error = %e, "Termination handler failed");
            }
        }

        true
    }

    /// Fire the cancellation signal without deciding a reason.
    ///
    /// Used for operator interrupts: work stops, but no handler runs and a
    /// later [`Self::terminate`] can still win.
    pub fn cancel(&self) {
        if !self.cancelled.send_replace(true) {
            info!("Cancellation requested");
        }
    }

    /// Wait until the cancellation signal fires.
    pub async fn cancelled(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl fmt::Debug for TerminationArbiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminationArbiter")
            .field("role", &self.role)
            .field("reason", &self.reason())
            .field("cancelled", &self.is_cancelled())
            .field("handlers", &self.handler_count())
            .finish()
    }
}
