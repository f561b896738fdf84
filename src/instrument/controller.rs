//! Starlight device controller
//!
//! This module provides the command/query surface for one physical Starlight unit
//! (four-channel light source plus picoammeter) on top of a [`DeviceLink`].
//!
//! The controller:
//! - tracks connection state and the serial number of the attached unit,
//! - rejects commands while disconnected and values outside the safety limits
//!   before anything reaches the link,
//! - maps every vendor status code to a typed [`DeviceError`].
//!
//! A `DeviceNotConnected` status from any command marks the controller disconnected
//! and clears its identity, so a later [`DeviceController::connect`] can re-attach.
//!
//! ## Example
//!
//! ```no_run
//! use starlight_daq::adapters::MockAdapter;
//! use starlight_daq::instrument::DeviceController;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut device = DeviceController::new("bench", Box::new(MockAdapter::new("0105")));
//!     if device.connect().await {
//!         device.set_light_source_current(1, 0.1).await?;
//!         let reading = device.read_detector_value().await?;
//!         println!("{}", reading);
//!     }
//!     Ok(())
//! }
//! ```

use crate::adapters::{DeviceLink, LinkFault, LinkResult};
use crate::error::{DeviceError, DeviceResult, Operation};
use crate::limits;
use crate::types::{
    ChannelCommand, ConnectionState, DetectorReading, DeviceIdentity, GainMode, LineFrequency,
};
use tracing::{error, info, instrument, warn};

/// Controller for a single Starlight unit.
pub struct DeviceController {
    /// Name used in logs
    label: String,
    link: Box<dyn DeviceLink>,
    state: ConnectionState,
    identity: DeviceIdentity,
}

impl DeviceController {
    /// Create a disconnected controller that owns `link`.
    pub fn new(label: impl Into<String>, link: Box<dyn DeviceLink>) -> Self {
        Self {
            label: label.into(),
            link,
            state: ConnectionState::Disconnected,
            identity: DeviceIdentity::Disconnected,
        }
    }

    /// Name used in logs; fixed at construction.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current link state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// `true` while a unit is attached.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Identity of the attached unit, or the disconnected sentinel.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Serial number of the attached unit, `None` while disconnected.
    pub fn serial_number(&self) -> Option<&str> {
        self.identity.serial()
    }

    /// Attach to the first responding unit and record its serial number.
    ///
    /// Returns `true` immediately, without touching the link, if already connected.
    /// Which unit is attached is decided by the link; with several identical units
    /// present the caller must check the serial number afterwards.
    #[instrument(skip(self), fields(device = %self.label))]
    pub async fn connect(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }

        if !self.link.connect().await {
            error!(link = self.link.name(), "Failed to find or connect to any Starlight device");
            return false;
        }

        let serial = self.link.serial_number().await;
        let serial = serial.trim();
        if serial.is_empty() {
            error!(
                link = self.link.name(),
                "Starlight device attached but reported no serial number"
            );
            self.link.disconnect().await;
            return false;
        }

        self.identity = DeviceIdentity::Serial(serial.to_string());
        self.state = ConnectionState::Connected;
        info!(serial = %self.identity, "Connected to Starlight device");
        true
    }

    /// Release the link and return to the disconnected state.
    #[instrument(skip(self), fields(device = %self.label))]
    pub async fn disconnect(&mut self) {
        self.link.disconnect().await;
        if self.is_connected() {
            info!(serial = %self.identity, "Disconnected from Starlight device");
        }
        self.mark_disconnected();
    }

    /// Drive light-source `channel` (`0..=4`) at `current_amps` (`0.0..=1.0`).
    pub async fn set_light_source_current(
        &mut self,
        channel: u8,
        current_amps: f64,
    ) -> DeviceResult<()> {
        self.apply(ChannelCommand::new(channel, current_amps)).await
    }

    /// Execute a validated [`ChannelCommand`].
    #[instrument(skip(self), fields(device = %self.label), err)]
    pub async fn apply(&mut self, command: ChannelCommand) -> DeviceResult<()> {
        let operation = command.operation();
        self.ensure_connected(operation)?;
        command.validate()?;

        let result = self
            .link
            .turn_on_channel(command.channel, command.current_amps)
            .await;
        self.check(result, operation)
    }

    /// Switch `channel` off; same as driving it at 0 A.
    pub async fn turn_off_light_source(&mut self, channel: u8) -> DeviceResult<()> {
        self.apply(ChannelCommand::off(channel)).await
    }

    /// Switch all five channels off.
    #[instrument(skip(self), fields(device = %self.label), err)]
    pub async fn turn_off_all_light_sources(&mut self) -> DeviceResult<()> {
        let operation = Operation::TurnOffAllLightSources;
        self.ensure_connected(operation)?;
        let result = self.link.turn_all_off().await;
        self.check(result, operation)
    }

    /// Read the picoammeter value and the gain stage it was measured at.
    ///
    /// Both fields come from one device response.
    #[instrument(skip(self), fields(device = %self.label), err)]
    pub async fn read_detector_value(&mut self) -> DeviceResult<DetectorReading> {
        let operation = Operation::ReadDetectorValue;
        self.ensure_connected(operation)?;
        let result = self.link.read_detector().await;
        self.check(result, operation)
    }

    /// Zero the picoammeter.
    ///
    /// No light may reach the detector while zeroing. That is the caller's job;
    /// the unit has no way to check it.
    #[instrument(skip(self), fields(device = %self.label), err)]
    pub async fn zero_detector(&mut self) -> DeviceResult<()> {
        let operation = Operation::ZeroDetector;
        self.ensure_connected(operation)?;
        let result = self.link.zero().await;
        self.check(result, operation)
    }

    /// Let the picoammeter pick its gain stage.
    #[instrument(skip(self), fields(device = %self.label), err)]
    pub async fn set_detector_auto_gain(&mut self) -> DeviceResult<()> {
        let operation = Operation::SetDetectorAutoGain;
        self.ensure_connected(operation)?;
        let result = self.link.set_auto_gain().await;
        self.check(result, operation)
    }

    /// Fix the picoammeter gain stage (`0..=5`).
    #[instrument(skip(self), fields(device = %self.label), err)]
    pub async fn set_detector_manual_gain(&mut self, gain: u8) -> DeviceResult<()> {
        let operation = Operation::SetDetectorManualGain { gain };
        self.ensure_connected(operation)?;
        limits::validate_manual_gain(gain, operation)?;
        let result = self.link.set_manual_gain(gain).await;
        self.check(result, operation)
    }

    /// Apply a [`GainMode`] through the auto or manual gain command.
    pub async fn set_detector_gain(&mut self, mode: GainMode) -> DeviceResult<()> {
        match mode {
            GainMode::Auto => self.set_detector_auto_gain().await,
            GainMode::Manual(gain) => self.set_detector_manual_gain(gain).await,
        }
    }

    /// Select the mains frequency the picoammeter filters out.
    #[instrument(skip(self), fields(device = %self.label), err)]
    pub async fn set_detector_line_frequency(
        &mut self,
        frequency: LineFrequency,
    ) -> DeviceResult<()> {
        let operation = Operation::SetDetectorLineFrequency { frequency };
        self.ensure_connected(operation)?;
        let result = self.link.set_line_frequency(frequency).await;
        self.check(result, operation)
    }

    fn ensure_connected(&self, operation: Operation) -> DeviceResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(DeviceError::NotConnected { operation })
        }
    }

    /// Map a link outcome to the controller's fault model.
    fn check<T>(&mut self, result: LinkResult<T>, operation: Operation) -> DeviceResult<T> {
        let fault = match result {
            Ok(value) => return Ok(value),
            Err(fault) => fault,
        };

        let err = match fault {
            LinkFault::DeviceNotConnected => {
                self.mark_disconnected();
                DeviceError::ConnectionLost { operation }
            }
            LinkFault::InvalidChannelOrGain => DeviceError::invalid_argument(
                operation,
                "channel or gain",
                "rejected by device",
            ),
            LinkFault::WrongResponse => DeviceError::Protocol { operation },
            LinkFault::SerialComError => DeviceError::Transport { operation },
            LinkFault::Other(code) => DeviceError::Unknown { operation, code },
        };
        warn!(device = %self.label, code = fault.code(), "{}", err);
        Err(err)
    }

    fn mark_disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.identity = DeviceIdentity::Disconnected;
    }
}

impl std::fmt::Debug for DeviceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceController")
            .field("label", &self.label)
            .field("link", &self.link.name())
            .field("state", &self.state)
            .field("identity", &self.identity)
            .finish()
    }
}
