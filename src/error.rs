//! Custom error types for the application.
//!
//! This module defines `DeviceError`, the fault model shared by every Starlight
//! device operation. Using the `thiserror` crate, it gives callers a precise,
//! matchable failure for each way a command can go wrong, from caller mistakes
//! to faults reported by the vendor link.
//!
//! ## Error Hierarchy
//!
//! - **`NotConnected`**: the controller was asked to do something before `connect()`
//!   succeeded (or after the link was lost). Raised locally, nothing reaches the link.
//! - **`InvalidArgument`**: a channel, current or gain value outside its contract range.
//!   Raised locally for caller-supplied values, or mapped from the link's
//!   invalid-channel/gain status code.
//! - **`ConnectionLost`**: the link reported that the device vanished. The controller
//!   resets itself to disconnected so a later `connect()` can re-establish it.
//! - **`Protocol`**: the device answered with something the link could not match.
//! - **`Transport`**: serial-level failure such as a read timeout.
//! - **`Unknown`**: a status code outside the vendor table, kept verbatim.
//! - **`SetupFailed`**: the orchestrator could not map the connected devices onto roles.
//!
//! Every variant except `SetupFailed` records the [`Operation`] that was being attempted.

use crate::types::{LineFrequency, Role};
use std::fmt;
use thiserror::Error;

/// Convenience alias for results of device operations.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;

/// The device operation a fault was raised from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    /// Connecting to the first responding device.
    Connect,
    /// Driving a light-source channel.
    SetLightSourceCurrent {
        /// Requested channel.
        channel: u8,
        /// Requested current in amps.
        current_amps: f64,
    },
    /// Switching every light-source channel off.
    TurnOffAllLightSources,
    /// Reading the picoammeter.
    ReadDetectorValue,
    /// Zeroing the picoammeter.
    ZeroDetector,
    /// Enabling picoammeter auto gain.
    SetDetectorAutoGain,
    /// Selecting a fixed picoammeter gain stage.
    SetDetectorManualGain {
        /// Requested gain stage.
        gain: u8,
    },
    /// Selecting the picoammeter mains filter.
    SetDetectorLineFrequency {
        /// Requested filter.
        frequency: LineFrequency,
    },
    /// A role-addressed read made through the orchestrator.
    ReadRole {
        /// Role being read.
        role: Role,
    },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Connect => write!(f, "connect"),
            Operation::SetLightSourceCurrent {
                channel,
                current_amps,
            } => write!(f, "set channel {} current to {} A", channel, current_amps),
            Operation::TurnOffAllLightSources => write!(f, "turn off all light sources"),
            Operation::ReadDetectorValue => write!(f, "read detector value"),
            Operation::ZeroDetector => write!(f, "zero detector"),
            Operation::SetDetectorAutoGain => write!(f, "set detector auto gain"),
            Operation::SetDetectorManualGain { gain } => {
                write!(f, "set detector manual gain to {}", gain)
            }
            Operation::SetDetectorLineFrequency { frequency } => {
                write!(f, "set detector line filter to {}", frequency)
            }
            Operation::ReadRole { role } => write!(f, "read device {}", role),
        }
    }
}

/// Typed failure of a Starlight device operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// Command issued before a successful connect.
    #[error("{operation} failed: device not connected, call connect() first")]
    NotConnected {
        /// Operation that was refused
        operation: Operation,
    },

    /// Caller-supplied value outside its contract range, or rejected by the device.
    #[error("{operation} failed: invalid {parameter}: {reason}")]
    InvalidArgument {
        /// Operation that was refused
        operation: Operation,
        /// Name of the offending parameter
        parameter: &'static str,
        /// Allowed range and the value given
        reason: String,
    },

    /// The link reported the device gone; the controller is now disconnected.
    #[error("{operation} failed: connection to device lost")]
    ConnectionLost {
        /// Operation that hit the lost link
        operation: Operation,
    },

    /// The device answered with a frame the link could not match.
    #[error("{operation} failed: device returned an unexpected response")]
    Protocol {
        /// Operation that got the bad response
        operation: Operation,
    },

    /// Serial-level failure such as a timeout.
    #[error("{operation} failed: serial communication error (e.g. timeout)")]
    Transport {
        /// Operation whose exchange failed
        operation: Operation,
    },

    /// Status code outside the vendor table.
    #[error("{operation} failed: unknown error code {code}")]
    Unknown {
        /// Operation that returned the code
        operation: Operation,
        /// Raw status code
        code: i32,
    },

    /// Roles could not be resolved, or no longer match the attached units.
    #[error("Device setup failed: {reason}")]
    SetupFailed {
        /// Diagnostic naming the expected and reported serials
        reason: String,
    },
}

/// Fieldless discriminant of [`DeviceError`], for matching without caring about payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// [`DeviceError::NotConnected`]
    NotConnected,
    /// [`DeviceError::InvalidArgument`]
    InvalidArgument,
    /// [`DeviceError::ConnectionLost`]
    ConnectionLost,
    /// [`DeviceError::Protocol`]
    Protocol,
    /// [`DeviceError::Transport`]
    Transport,
    /// [`DeviceError::Unknown`]
    Unknown,
    /// [`DeviceError::SetupFailed`]
    SetupFailed,
}

impl DeviceError {
    /// Which kind of fault this is.
    pub fn kind(&self) -> FaultKind {
        match self {
            DeviceError::NotConnected { .. } => FaultKind::NotConnected,
            DeviceError::InvalidArgument { .. } => FaultKind::InvalidArgument,
            DeviceError::ConnectionLost { .. } => FaultKind::ConnectionLost,
            DeviceError::Protocol { .. } => FaultKind::Protocol,
            DeviceError::Transport { .. } => FaultKind::Transport,
            DeviceError::Unknown { .. } => FaultKind::Unknown,
            DeviceError::SetupFailed { .. } => FaultKind::SetupFailed,
        }
    }

    /// The operation that failed, if the fault came from a device operation.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            DeviceError::NotConnected { operation }
            | DeviceError::InvalidArgument { operation, .. }
            | DeviceError::ConnectionLost { operation }
            | DeviceError::Protocol { operation }
            | DeviceError::Transport { operation }
            | DeviceError::Unknown { operation, .. } => Some(*operation),
            DeviceError::SetupFailed { .. } => None,
        }
    }

    pub(crate) fn invalid_argument(
        operation: Operation,
        parameter: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        DeviceError::InvalidArgument {
            operation,
            parameter,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DeviceError::NotConnected {
            operation: Operation::ZeroDetector,
        };
        assert_eq!(
            err.to_string(),
            "zero detector failed: device not connected, call connect() first"
        );
    }

    #[test]
    fn test_invalid_argument_names_parameter() {
        let err = DeviceError::invalid_argument(
            Operation::SetLightSourceCurrent {
                channel: 7,
                current_amps: 0.1,
            },
            "channel",
            "must be between 0 and 4, got 7",
        );
        let text = err.to_string();
        assert!(text.contains("invalid channel"));
        assert!(text.starts_with("set channel 7 current to 0.1 A failed"));
    }

    #[test]
    fn test_unknown_keeps_raw_code() {
        let err = DeviceError::Unknown {
            operation: Operation::ReadDetectorValue,
            code: 42,
        };
        assert_eq!(err.kind(), FaultKind::Unknown);
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_setup_failed_has_no_operation() {
        let err = DeviceError::SetupFailed {
            reason: "unexpected serial 9999".into(),
        };
        assert_eq!(err.operation(), None);
        assert_eq!(err.kind(), FaultKind::SetupFailed);
    }
}
