//! Device link implementations
//!
//! A [`DeviceLink`] is the vendor-level transport beneath a Starlight controller:
//! it attaches to the first responding unit, exchanges fixed ASCII frames and
//! reports each command's outcome as a vendor status code. Controllers own exactly
//! one link each and never share it.

pub mod mock;
pub mod protocol;
#[cfg(feature = "instrument_serial")]
pub mod serial_adapter;

pub use mock::{MockAdapter, MockCall};
#[cfg(feature = "instrument_serial")]
pub use serial_adapter::{SerialAdapter, SerialLinkConfig};

use crate::types::{DetectorReading, LineFrequency};
use async_trait::async_trait;
use tracing::warn;

/// Vendor status code for success.
pub const RET_NO_ERROR: i32 = 0;
/// Vendor status code: no device attached to the link.
pub const RET_DEVICE_NOT_CONNECTED: i32 = 1;
/// Vendor status code: channel (or gain, which shares the code) rejected.
pub const RET_INVALID_CHANNEL: i32 = 2;
/// Vendor status code: gain rejected. Same value as [`RET_INVALID_CHANNEL`].
pub const RET_INVALID_GAIN: i32 = RET_INVALID_CHANNEL;
/// Vendor status code: device answered with an unexpected frame.
pub const RET_WRONG_RESPONSE: i32 = 3;
/// Vendor status code: serial I/O failed or timed out.
pub const RET_SERIAL_COM_ERROR: i32 = 4;

/// A non-success vendor status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFault {
    /// [`RET_DEVICE_NOT_CONNECTED`]
    DeviceNotConnected,
    /// [`RET_INVALID_CHANNEL`] / [`RET_INVALID_GAIN`]
    InvalidChannelOrGain,
    /// [`RET_WRONG_RESPONSE`]
    WrongResponse,
    /// [`RET_SERIAL_COM_ERROR`]
    SerialComError,
    /// Any code outside the vendor table
    Other(i32),
}

impl LinkFault {
    /// Decode a raw status code; `None` means success.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            RET_NO_ERROR => None,
            RET_DEVICE_NOT_CONNECTED => Some(LinkFault::DeviceNotConnected),
            RET_INVALID_CHANNEL => Some(LinkFault::InvalidChannelOrGain),
            RET_WRONG_RESPONSE => Some(LinkFault::WrongResponse),
            RET_SERIAL_COM_ERROR => Some(LinkFault::SerialComError),
            other => Some(LinkFault::Other(other)),
        }
    }

    /// The raw vendor status code.
    pub fn code(self) -> i32 {
        match self {
            LinkFault::DeviceNotConnected => RET_DEVICE_NOT_CONNECTED,
            LinkFault::InvalidChannelOrGain => RET_INVALID_CHANNEL,
            LinkFault::WrongResponse => RET_WRONG_RESPONSE,
            LinkFault::SerialComError => RET_SERIAL_COM_ERROR,
            LinkFault::Other(code) => code,
        }
    }
}

/// Outcome of a link command: `Ok` for `RET_NO_ERROR`, otherwise the fault.
pub type LinkResult<T> = std::result::Result<T, LinkFault>;

/// Convert a raw status code into a [`LinkResult`].
pub fn check_status(code: i32) -> LinkResult<()> {
    match LinkFault::from_code(code) {
        None => Ok(()),
        Some(fault) => Err(fault),
    }
}

/// Vendor transport for one Starlight unit.
///
/// Implementations are not safe for overlapping use; callers hold `&mut self` for
/// the whole exchange.
#[async_trait]
pub trait DeviceLink: Send {
    /// Short name for logs ("serial", "mock").
    fn name(&self) -> &str;

    /// Attach to the first device that responds. Returns whether one was found.
    async fn connect(&mut self) -> bool;

    /// Serial number of the attached device, empty if none.
    async fn serial_number(&mut self) -> String;

    /// Drive light-source `channel` at `amps`.
    async fn turn_on_channel(&mut self, channel: u8, amps: f64) -> LinkResult<()>;

    /// Switch every light-source channel off.
    ///
    /// The default drives each channel at 0 A. Every channel is attempted even
    /// after a failure, and the first fault is returned.
    async fn turn_all_off(&mut self) -> LinkResult<()> {
        let mut first_fault = None;
        for channel in crate::limits::CHANNELS {
            if let Err(fault) = self.turn_on_channel(channel, 0.0).await {
                warn!(channel, code = fault.code(), "Failed to switch light source off");
                first_fault.get_or_insert(fault);
            }
        }
        first_fault.map_or(Ok(()), Err)
    }

    /// Read the picoammeter value together with the gain stage it was taken at.
    async fn read_detector(&mut self) -> LinkResult<DetectorReading>;

    /// Zero the picoammeter.
    async fn zero(&mut self) -> LinkResult<()>;

    /// Let the picoammeter choose its gain stage.
    async fn set_auto_gain(&mut self) -> LinkResult<()>;

    /// Fix the picoammeter gain stage.
    async fn set_manual_gain(&mut self, gain: u8) -> LinkResult<()>;

    /// Select the mains filter of the picoammeter.
    async fn set_line_frequency(&mut self, frequency: LineFrequency) -> LinkResult<()>;

    /// Release the attached device, if any.
    async fn disconnect(&mut self) {}
}
