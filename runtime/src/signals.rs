//! Glue between the termination arbiter and the control channel.
//!
//! Inbound, [`TerminateOnControlCode`] turns a code from the peer into a
//! local termination. Outbound, [`NotifyPeer`] runs as a winner-only
//! termination handler and tells the peer why this process stopped, so each
//! code goes out at most once.

use crate::metrics::ControlMetrics;
use airsales_core::{
    ControlCode, ControlSendError, ControlSender, ProcessRole, TerminationArbiter,
    TerminationHandler, TerminationReason,
};
use airsales_ipc::ControlHandler;
use std::sync::Arc;
use tracing::{debug, warn};

/// True when `code` is meant for a process playing `role`.
#[must_use]
pub const fn accepts(role: ProcessRole, code: ControlCode) -> bool {
    match role {
        ProcessRole::Seller => code.is_from_manager(),
        ProcessRole::Manager => !code.is_from_manager(),
    }
}

/// Code a process playing `role` sends to its peer when it stops for
/// `reason`.
///
/// The Seller only reports a sell-out; the Manager reports its own timer and
/// threshold decisions and stays silent on a sell-out it was told about.
#[must_use]
pub const fn outbound_code(role: ProcessRole, reason: TerminationReason) -> Option<ControlCode> {
    match (role, reason) {
        (ProcessRole::Seller, TerminationReason::SoldOut) => Some(ControlCode::AllFlightsSoldOut),
        (ProcessRole::Manager, TerminationReason::Departure) => Some(ControlCode::Departure),
        (ProcessRole::Manager, TerminationReason::TooRich) => Some(ControlCode::WeAreTooRichNow),
        _ => None,
    }
}

/// Terminates the local process when the peer sends a code meant for it.
///
/// Codes travelling in the wrong direction are logged and ignored.
#[derive(Debug)]
pub struct TerminateOnControlCode {
    arbiter: Arc<TerminationArbiter>,
}

impl TerminateOnControlCode {
    /// Handler feeding `arbiter`.
    #[must_use]
    pub const fn new(arbiter: Arc<TerminationArbiter>) -> Self {
        Self { arbiter }
    }
}

impl ControlHandler for TerminateOnControlCode {
    fn on_code(&self, code: ControlCode) {
        let role = self.arbiter.role();
        if !accepts(role, code) {
            ControlMetrics::record_ignored(code);
            warn!(%code, ?role, "Unexpected control code for this process, ignoring");
            return;
        }

        ControlMetrics::record_received(code);
        self.arbiter.terminate(code.reason());
    }
}

/// Tells the peer why this process stopped.
pub struct NotifyPeer {
    role: ProcessRole,
    sender: Arc<dyn ControlSender>,
}

impl NotifyPeer {
    /// Handler for a process playing `role`, sending through `sender`.
    #[must_use]
    pub fn new(role: ProcessRole, sender: Arc<dyn ControlSender>) -> Self {
        Self { role, sender }
    }
}

impl TerminationHandler for NotifyPeer {
    fn name(&self) -> &str {
        "notify-peer"
    }

    fn on_terminate(&self, reason: TerminationReason) -> Result<(), String> {
        let Some(code) = outbound_code(self.role, reason) else {
            return Ok(());
        };

        match self.sender.send(code) {
            Ok(()) => {
                ControlMetrics::record_sent(code);
                Ok(())
            }
            Err(ControlSendError::NotConnected) => {
                debug!(%code, "No control peer to notify");
                Ok(())
            }
            Err(e) => {
                ControlMetrics::record_send_failure();
                Err(format!("failed to send {code}: {e}"))
            }
        }
    }
}

/// Counts the winning termination.
#[derive(Debug, Default)]
pub struct RecordTermination;

impl TerminationHandler for RecordTermination {
    fn name(&self) -> &str {
        "record-termination"
    }

    fn on_terminate(&self, reason: TerminationReason) -> Result<(), String> {
        ControlMetrics::record_termination(reason);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_follows_role() {
        assert!(accepts(ProcessRole::Seller, ControlCode::Departure));
        assert!(accepts(ProcessRole::Seller, ControlCode::WeAreTooRichNow));
        assert!(!accepts(ProcessRole::Seller, ControlCode::AllFlightsSoldOut));
        assert!(accepts(ProcessRole::Manager, ControlCode::AllFlightsSoldOut));
        assert!(!accepts(ProcessRole::Manager, ControlCode::Departure));
    }

    #[test]
    fn outbound_codes_per_role() {
        assert_eq!(
            outbound_code(ProcessRole::Seller, TerminationReason::SoldOut),
            Some(ControlCode::AllFlightsSoldOut)
        );
        assert_eq!(outbound_code(ProcessRole::Seller, TerminationReason::Departure), None);
        assert_eq!(outbound_code(ProcessRole::Seller, TerminationReason::TooRich), None);
        assert_eq!(
            outbound_code(ProcessRole::Manager, TerminationReason::TooRich),
            Some(ControlCode::WeAreTooRichNow)
        );
        assert_eq!(outbound_code(ProcessRole::Manager, TerminationReason::SoldOut), None);
    }

    #[test]
    fn wrong_direction_code_does_not_terminate() {
        let arbiter = Arc::new(TerminationArbiter::new(ProcessRole::Seller));
        let handler = TerminateOnControlCode::new(Arc::clone(&arbiter));

        handler.on_code(ControlCode::AllFlightsSoldOut);
        assert!(!arbiter.is_terminated());

        handler.on_code(ControlCode::WeAreTooRichNow);
        assert_eq!(arbiter.reason(), Some(TerminationReason::TooRich));
    }

    struct ClosedConnection;

    impl ControlSender for ClosedConnection {
        fn send(&self, _code: ControlCode) -> Result<(), ControlSendError> {
            Err(ControlSendError::ConnectionClosed)
        }
    }

    #[test]
    fn lost_peer_fails_notify_without_stopping_other_handlers() {
        let notify = NotifyPeer::new(ProcessRole::Seller, Arc::new(ClosedConnection));
        assert!(notify.on_terminate(TerminationReason::SoldOut).is_err());

        let arbiter = TerminationArbiter::new(ProcessRole::Seller);
        let recorded = Arc::new(airsales_testing::RecordingTerminationHandler::new());
        arbiter.register(Arc::new(notify));
        arbiter.register(recorded.clone());

        assert!(arbiter.terminate(TerminationReason::SoldOut));
        assert_eq!(recorded.reasons(), vec![TerminationReason::SoldOut]);
        assert!(arbiter.is_cancelled());
    }

    #[test]
    fn missing_peer_is_not_a_notify_failure() {
        let sender = Arc::new(airsales_testing::RecordingControlSender::disconnected());
        let notify = NotifyPeer::new(ProcessRole::Manager, sender.clone());

        assert_eq!(notify.on_terminate(TerminationReason::Departure), Ok(()));
        assert!(sender.sent().is_empty());

        sender.set_connected(true);
        assert_eq!(notify.on_terminate(TerminationReason::Departure), Ok(()));
        assert_eq!(sender.sent(), vec![ControlCode::Departure]);
    }
}
