//! One-byte control protocol between Manager and Seller.
//!
//! Each logical message is exactly one byte. The Manager sends
//! [`ControlCode::Departure`] and [`ControlCode::WeAreTooRichNow`]; the Seller
//! sends [`ControlCode::AllFlightsSoldOut`]. Payloads of any other length are
//! ignored, and an unknown byte is reported but never fatal.

use crate::termination::TerminationReason;
use std::fmt;
use thiserror::Error;

/// A control signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlCode {
    /// The departure timer elapsed (Manager → Seller)
    Departure = 0x5D,
    /// The revenue threshold was reached (Manager → Seller)
    WeAreTooRichNow = 0x7A,
    /// Every flight is sold out (Seller → Manager)
    AllFlightsSoldOut = 0x9E,
}

impl ControlCode {
    /// Wire byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Parse a single wire byte.
    ///
    /// # Errors
    ///
    /// Returns [`ControlCodeError::Unknown`] for bytes outside the protocol.
    pub const fn from_byte(byte: u8) -> Result<Self, ControlCodeError> {
        match byte {
            0x5D => Ok(Self::Departure),
            0x7A => Ok(Self::WeAreTooRichNow),
            0x9E => Ok(Self::AllFlightsSoldOut),
            other => Err(ControlCodeError::Unknown(other)),
        }
    }

    /// Parse a received payload.
    ///
    /// # Errors
    ///
    /// Returns [`ControlCodeError::InvalidLength`] unless the payload is
    /// exactly one byte, or [`ControlCodeError::Unknown`] for an unknown byte.
    pub fn decode(payload: &[u8]) -> Result<Self, ControlCodeError> {
        match payload {
            [byte] => Self::from_byte(*byte),
            _ => Err(ControlCodeError::InvalidLength(payload.len())),
        }
    }

    /// True for codes the Manager sends to the Seller.
    #[must_use]
    pub const fn is_from_manager(self) -> bool {
        matches!(self, Self::Departure | Self::WeAreTooRichNow)
    }

    /// The termination this code asks the receiver to perform.
    #[must_use]
    pub const fn reason(self) -> TerminationReason {
        match self {
            Self::Departure => TerminationReason::Departure,
            Self::WeAreTooRichNow => TerminationReason::TooRich,
            Self::AllFlightsSoldOut => TerminationReason::SoldOut,
        }
    }
}

impl fmt::Display for ControlCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Departure => write!(f, "Departure"),
            Self::WeAreTooRichNow => write!(f, "WeAreTooRichNow"),
            Self::AllFlightsSoldOut => write!(f, "AllFlightsSoldOut"),
        }
    }
}

/// A received payload that is not a control code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCodeError {
    /// Payload was not exactly one byte
    #[error("control payload must be 1 byte, got {0}")]
    InvalidLength(usize),

    /// Byte is not part of the protocol
    #[error("unknown control code 0x{0:02X}")]
    Unknown(u8),
}

/// Failure to deliver a control code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlSendError {
    /// No peer has connected yet
    #[error("no control peer connected")]
    NotConnected,

    /// The connection to the peer is gone
    #[error("control connection closed")]
    ConnectionClosed,
}

/// Sends control codes to the other process.
///
/// Implementations must not block: callers include worker threads and
/// timer tasks.
pub trait ControlSender: Send + Sync {
    /// Queue `code` for delivery to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ControlSendError`] when there is no live connection. Callers
    /// log it and continue.
    fn send(&self, code: ControlCode) -> Result<(), ControlSendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_fixed() {
        assert_eq!(ControlCode::Departure.as_byte(), 0x5D);
        assert_eq!(ControlCode::WeAreTooRichNow.as_byte(), 0x7A);
        assert_eq!(ControlCode::AllFlightsSoldOut.as_byte(), 0x9E);
    }

    #[test]
    fn decode_accepts_single_known_byte() {
        assert_eq!(ControlCode::decode(&[0x7A]), Ok(ControlCode::WeAreTooRichNow));
        assert_eq!(ControlCode::decode(&[0x9E]), Ok(ControlCode::AllFlightsSoldOut));
    }

    #[test]
    fn decode_rejects_other_lengths() {
        assert_eq!(ControlCode::decode(&[]), Err(ControlCodeError::InvalidLength(0)));
        assert_eq!(
            ControlCode::decode(&[0x5D, 0x5D]),
            Err(ControlCodeError::InvalidLength(2))
        );
    }

    #[test]
    fn decode_reports_unknown_byte() {
        assert_eq!(ControlCode::decode(&[0x01]), Err(ControlCodeError::Unknown(0x01)));
    }

    #[test]
    fn codes_map_to_reasons() {
        assert_eq!(ControlCode::Departure.reason(), TerminationReason::Departure);
        assert_eq!(ControlCode::WeAreTooRichNow.reason(), TerminationReason::TooRich);
        assert_eq!(ControlCode::AllFlightsSoldOut.reason(), TerminationReason::SoldOut);
        assert!(!ControlCode::AllFlightsSoldOut.is_from_manager());
    }
}
