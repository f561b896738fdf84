//! Value types shared by the controller, orchestrator and monitor.

use crate::error::{DeviceResult, Operation};
use crate::limits;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text shown in place of a serial number while no device is attached.
pub const DISCONNECTED_LABEL: &str = "disconnected";

/// Serial number of the unit a controller is attached to.
///
/// Only set by a successful connect; any connection-loss fault resets it to
/// [`DeviceIdentity::Disconnected`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeviceIdentity {
    /// No unit attached.
    #[default]
    Disconnected,
    /// Serial number reported at connect time.
    Serial(String),
}

impl DeviceIdentity {
    /// The reported serial number, or `None` while disconnected.
    pub fn serial(&self) -> Option<&str> {
        match self {
            DeviceIdentity::Disconnected => None,
            DeviceIdentity::Serial(serial) => Some(serial),
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.serial().unwrap_or(DISCONNECTED_LABEL))
    }
}

/// Link state of a single controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Commands other than connect are refused.
    #[default]
    Disconnected,
    /// A unit is attached and its serial number is known.
    Connected,
}

/// One picoammeter measurement.
///
/// Value and gain always come from the same device response, so the gain is the
/// stage that was active when the value was measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorReading {
    /// Measured current. Scaled by a calibration factor it gives illuminance in lux.
    pub value: f64,
    /// Gain stage in effect at measurement time.
    pub gain: u8,
}

impl fmt::Display for DetectorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value: {}, Gain: {}", self.value, self.gain)
    }
}

/// A light-source drive request, checked against the hardware safety limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelCommand {
    /// Light-source channel, `0..=4`
    pub channel: u8,
    /// Drive current in amps, `0.0..=1.0`
    pub current_amps: f64,
}

impl ChannelCommand {
    /// Unchecked command; see [`ChannelCommand::validate`].
    pub fn new(channel: u8, current_amps: f64) -> Self {
        Self {
            channel,
            current_amps,
        }
    }

    /// Command that switches `channel` off.
    pub fn off(channel: u8) -> Self {
        Self::new(channel, 0.0)
    }

    /// Check channel range first, then the current ceiling.
    pub fn validate(&self) -> DeviceResult<()> {
        let operation = self.operation();
        limits::validate_channel(self.channel, operation)?;
        limits::validate_current(self.current_amps, operation)
    }

    pub(crate) fn operation(&self) -> Operation {
        Operation::SetLightSourceCurrent {
            channel: self.channel,
            current_amps: self.current_amps,
        }
    }
}

/// Picoammeter gain selection.
///
/// In configuration files this is either `"auto"` or a bare stage number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "GainSetting", into = "GainSetting")]
pub enum GainMode {
    /// The detector picks its own stage per measurement.
    Auto,
    /// Fixed stage, `0..=5`.
    Manual(u8),
}

/// Configuration form of [`GainMode`]. Stage bounds are checked by the caller.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum GainSetting {
    Stage(u8),
    Named(String),
}

impl TryFrom<GainSetting> for GainMode {
    type Error = String;

    fn try_from(setting: GainSetting) -> Result<Self, Self::Error> {
        match setting {
            GainSetting::Stage(stage) => Ok(GainMode::Manual(stage)),
            GainSetting::Named(name) if name.eq_ignore_ascii_case("auto") => Ok(GainMode::Auto),
            GainSetting::Named(name) => Err(format!(
                "unknown gain '{}', expected \"auto\" or a stage number",
                name
            )),
        }
    }
}

impl From<GainMode> for GainSetting {
    fn from(mode: GainMode) -> Self {
        match mode {
            GainMode::Auto => GainSetting::Named("auto".to_string()),
            GainMode::Manual(stage) => GainSetting::Stage(stage),
        }
    }
}

/// Mains frequency the picoammeter filter rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineFrequency {
    /// 50 Hz mains
    #[serde(rename = "50hz", alias = "50Hz")]
    Hz50,
    /// 60 Hz mains
    #[serde(rename = "60hz", alias = "60Hz")]
    Hz60,
}

impl fmt::Display for LineFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineFrequency::Hz50 => write!(f, "50 Hz"),
            LineFrequency::Hz60 => write!(f, "60 Hz"),
        }
    }
}

/// Stable logical name for one of the two physical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// First role; polled first
    #[serde(alias = "A")]
    A,
    /// Second role
    #[serde(alias = "B")]
    B,
}

impl Role {
    /// Both roles, in polling order.
    pub const ALL: [Role; 2] = [Role::A, Role::B];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::A => write!(f, "A"),
            Role::B => write!(f, "B"),
        }
    }
}
