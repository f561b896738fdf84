//! Hardware safety limits for Starlight commands.
//!
//! The vendor link accepts a wider range than the bench hardware tolerates; these
//! guards are applied before any command is sent.

use crate::error::{DeviceError, DeviceResult, Operation};
use std::ops::RangeInclusive;

/// Highest addressable light-source channel.
pub const MAX_CHANNEL: u8 = 4;
/// Light-source current ceiling in amps.
pub const MAX_CURRENT_AMPS: f64 = 1.0;
/// Highest manual picoammeter gain stage.
pub const MAX_MANUAL_GAIN: u8 = 5;

/// Valid light-source channels.
pub const CHANNELS: RangeInclusive<u8> = 0..=MAX_CHANNEL;
/// Safe light-source drive current, amps.
pub const CURRENT_AMPS: RangeInclusive<f64> = 0.0..=MAX_CURRENT_AMPS;
/// Valid manual gain stages.
pub const MANUAL_GAINS: RangeInclusive<u8> = 0..=MAX_MANUAL_GAIN;

/// Reject channels outside `0..=4`.
pub fn validate_channel(channel: u8, operation: Operation) -> DeviceResult<()> {
    if CHANNELS.contains(&channel) {
        Ok(())
    } else {
        Err(DeviceError::invalid_argument(
            operation,
            "channel",
            format!("must be between 0 and {}, got {}", MAX_CHANNEL, channel),
        ))
    }
}

/// Reject currents outside `0.0..=1.0` A, including NaN.
pub fn validate_current(current_amps: f64, operation: Operation) -> DeviceResult<()> {
    if CURRENT_AMPS.contains(&current_amps) {
        Ok(())
    } else {
        Err(DeviceError::invalid_argument(
            operation,
            "current_amps",
            format!(
                "must be within the 0.0 A to {} A safety range, got {}",
                MAX_CURRENT_AMPS, current_amps
            ),
        ))
    }
}

/// Reject manual gain stages outside `0..=5`.
pub fn validate_manual_gain(gain: u8, operation: Operation) -> DeviceResult<()> {
    if MANUAL_GAINS.contains(&gain) {
        Ok(())
    } else {
        Err(DeviceError::invalid_argument(
            operation,
            "gain",
            format!("must be between 0 and {}, got {}", MAX_MANUAL_GAIN, gain),
        ))
    }
}
