//! Starlight ASCII frame protocol
//!
//! Protocol Overview:
//! - Format: fixed ASCII frames of the form `[:]:<verb>:<object>:<args>:`
//! - Terminator: CR (`\r`) on commands; responses end with CR or LF
//! - Responses echo the command prefix (case may differ), followed by the payload
//!
//! | Purpose | Command | Response prefix |
//! |---|---|---|
//! | identify | `[:]:id?:` | `[:]:id?:` + serial |
//! | light source current | `[:]:set:curr:<ch>:00:<amps>` | `[:]:set:curr:` |
//! | picoammeter read | `[:]:MSR:PAVL:01:03:` | same, then `<value>:<gain>` |
//! | zero picoammeter | `[:]:set:pacl:00:05:23.34` | `[:]:set:pacl:00:` |
//! | mains filter | `[:]:set:PAFT:01:50:` / `60:` | `...PicoAmpFilter is: 50 HZ` |
//! | gain | `[:]:set:PAGN:00:<stage>:235` (stage 10 = auto) | `[:]:set:PAGN:00:` |

use super::{LinkFault, LinkResult};
use crate::types::{DetectorReading, LineFrequency};

/// Frame terminator.
pub const TAIL: &str = "\r";

/// Identity query; the answer carries the serial number.
pub const READ_ID: &str = "[:]:id?:";
/// Echo prefix of a set-current command.
pub const SET_CURR_RESP: &str = "[:]:set:curr:";
/// Picoammeter read; the answer is `<echo><value>:<gain>`.
pub const READ_PA: &str = "[:]:MSR:PAVL:01:03:";
/// Picoammeter zero.
pub const ZERO_PA: &str = "[:]:set:pacl:00:05:23.34";
/// Echo prefix of [`ZERO_PA`].
pub const ZERO_PA_RESP: &str = "[:]:set:pacl:00:";
/// Select the 50 Hz mains filter.
pub const SET_LINEFREQ50: &str = "[:]:set:PAFT:01:50:";
/// Exact answer to [`SET_LINEFREQ50`].
pub const SET_LINEFREQ50_RESP: &str = "[:]:set:paft:01:PicoAmpFilter is: 50 HZ";
/// Select the 60 Hz mains filter.
pub const SET_LINEFREQ60: &str = "[:]:set:PAFT:01:60:";
/// Exact answer to [`SET_LINEFREQ60`].
pub const SET_LINEFREQ60_RESP: &str = "[:]:set:paft:01:PicoAmpFilter is: 60 HZ";
/// Echo prefix of a gain command.
pub const SET_PA_GAIN_RESP: &str = "[:]:set:PAGN:00:";

/// Gain stage code that selects auto ranging.
pub const GAIN_AUTO_CODE: u8 = 10;

/// Light-source drive command for `channel` at `amps`.
pub fn set_current_command(channel: u8, amps: f64) -> String {
    format!("[:]:set:curr:{:02}:00:{:.4}", channel, amps)
}

/// Gain command; pass [`GAIN_AUTO_CODE`] for auto gain.
pub fn set_gain_command(stage: u8) -> String {
    format!("[:]:set:PAGN:00:{:02}:235", stage)
}

/// Mains filter command and the exact response it must produce.
pub fn line_frequency_frames(frequency: LineFrequency) -> (&'static str, &'static str) {
    match frequency {
        LineFrequency::Hz50 => (SET_LINEFREQ50, SET_LINEFREQ50_RESP),
        LineFrequency::Hz60 => (SET_LINEFREQ60, SET_LINEFREQ60_RESP),
    }
}

/// Append the frame terminator.
pub fn frame(command: &str) -> String {
    format!("{}{}", command, TAIL)
}

/// Strip `prefix` from `response`, ignoring ASCII case. Returns the payload.
pub fn strip_prefix_ignore_case<'a>(response: &'a str, prefix: &str) -> Option<&'a str> {
    let head = response.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        response.get(prefix.len()..)
    } else {
        None
    }
}

/// Accept a response only if it echoes `prefix`.
pub fn expect_prefix(response: &str, prefix: &str) -> LinkResult<()> {
    strip_prefix_ignore_case(response.trim(), prefix)
        .map(|_| ())
        .ok_or(LinkFault::WrongResponse)
}

/// Accept a response only if it matches `expected` exactly, ignoring case.
pub fn expect_exact(response: &str, expected: &str) -> LinkResult<()> {
    if response.trim().eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(LinkFault::WrongResponse)
    }
}

/// Serial number carried by an id response, if it is one.
pub fn parse_serial_number(response: &str) -> Option<String> {
    let payload = strip_prefix_ignore_case(response.trim(), READ_ID)?;
    let serial = payload.trim().trim_end_matches(':').trim();
    if serial.is_empty() {
        None
    } else {
        Some(serial.to_string())
    }
}

/// Value and gain carried by a picoammeter read response (`<prefix><value>:<gain>`).
pub fn parse_detector_response(response: &str) -> LinkResult<DetectorReading> {
    let payload =
        strip_prefix_ignore_case(response.trim(), READ_PA).ok_or(LinkFault::WrongResponse)?;
    let mut fields = payload.trim_end_matches(':').split(':').map(str::trim);

    let value = fields
        .next()
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or(LinkFault::WrongResponse)?;
    let gain = fields
        .next()
        .and_then(|g| g.parse::<u8>().ok())
        .ok_or(LinkFault::WrongResponse)?;
    if fields.next().is_some() {
        return Err(LinkFault::WrongResponse);
    }

    Ok(DetectorReading { value, gain })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_command_format() {
        assert_eq!(set_current_command(1, 0.1), "[:]:set:curr:01:00:0.1000");
        assert_eq!(set_current_command(4, 1.0), "[:]:set:curr:04:00:1.0000");
        assert_eq!(frame(&set_current_command(0, 0.0)), "[:]:set:curr:00:00:0.0000\r");
    }

    #[test]
    fn gain_command_format() {
        assert_eq!(set_gain_command(3), "[:]:set:PAGN:00:03:235");
        assert_eq!(set_gain_command(GAIN_AUTO_CODE), "[:]:set:PAGN:00:10:235");
    }

    #[test]
    fn serial_number_parsing() {
        assert_eq!(parse_serial_number("[:]:id?:1266\r"), Some("1266".into()));
        assert_eq!(parse_serial_number("[:]:ID?:0105:"), Some("0105".into()));
        assert_eq!(parse_serial_number("[:]:id?:"), None);
        assert_eq!(parse_serial_number("garbage"), None);
    }

    #[test]
    fn detector_response_parsing() {
        let reading = parse_detector_response("[:]:msr:pavl:01:03:1.25E-9:3\r\n").unwrap();
        assert_eq!(reading.value, 1.25e-9);
        assert_eq!(reading.gain, 3);

        assert_eq!(
            parse_detector_response("[:]:MSR:PAVL:01:03:12.5"),
            Err(LinkFault::WrongResponse)
        );
        assert_eq!(
            parse_detector_response("[:]:set:curr:01:"),
            Err(LinkFault::WrongResponse)
        );
        assert_eq!(
            parse_detector_response("[:]:MSR:PAVL:01:03:abc:2"),
            Err(LinkFault::WrongResponse)
        );
    }

    #[test]
    fn response_prefix_is_case_insensitive() {
        assert!(expect_prefix("[:]:set:pagn:00:03", SET_PA_GAIN_RESP).is_ok());
        assert!(expect_prefix("[:]:set:pacl:00:ok", ZERO_PA_RESP).is_ok());
        assert_eq!(
            expect_prefix("[:]:set:curr", SET_CURR_RESP),
            Err(LinkFault::WrongResponse)
        );
    }

    #[test]
    fn line_frequency_expects_exact_echo() {
        let (cmd, resp) = line_frequency_frames(LineFrequency::Hz60);
        assert_eq!(cmd, "[:]:set:PAFT:01:60:");
        assert!(expect_exact("[:]:set:paft:01:PicoAmpFilter is: 60 HZ\r", resp).is_ok());
        assert!(expect_exact("[:]:set:paft:01:PicoAmpFilter is: 50 HZ", resp).is_err());
    }
}
