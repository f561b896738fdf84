//! Mock device link for testing and simulation
//!
//! This link stands in for a Starlight unit without any hardware. It provides:
//! - A fixed serial number and scripted detector readings
//! - Controllable failure injection (per command, or a vanished device)
//! - Call logging for test verification
//!
//! Clones share state, so a test can keep one handle while a controller owns another.

use super::{DeviceLink, LinkFault, LinkResult};
use crate::types::{DetectorReading, LineFrequency};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded call on a [`MockAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    /// `connect`
    Connect,
    /// `serial_number`
    SerialNumber,
    /// `turn_on_channel`, including 0 A
    TurnOnChannel {
        /// Light-source channel
        channel: u8,
        /// Requested current
        amps: f64,
    },
    /// `turn_all_off`
    TurnAllOff,
    /// `read_detector`
    ReadDetector,
    /// `zero`
    Zero,
    /// `set_auto_gain`
    SetAutoGain,
    /// `set_manual_gain` with the requested stage
    SetManualGain(u8),
    /// `set_line_frequency`
    SetLineFrequency(LineFrequency),
    /// `disconnect`
    Disconnect,
}

#[derive(Debug)]
struct MockState {
    serial: String,
    connect_succeeds: bool,
    attached: bool,
    reading: DetectorReading,
    ramp_step: f64,
    gone: bool,
    injected: VecDeque<LinkFault>,
    calls: Vec<MockCall>,
}

/// Scriptable in-memory [`DeviceLink`].
///
/// # Example
///
/// ```
/// use starlight_daq::adapters::{LinkFault, MockAdapter};
///
/// let link = MockAdapter::new("0105").with_reading(12.5, 3);
/// link.inject_next_failure(LinkFault::SerialComError);
/// assert_eq!(link.call_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockAdapter {
    state: Arc<Mutex<MockState>>,
}

impl MockAdapter {
    /// A unit that answers with `serial` and reads `0.0` at gain `0`.
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                serial: serial.into(),
                connect_succeeds: true,
                attached: false,
                reading: DetectorReading { value: 0.0, gain: 0 },
                ramp_step: 0.0,
                gone: false,
                injected: VecDeque::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// A link on which no device ever responds.
    pub fn unavailable() -> Self {
        let link = Self::new("");
        link.lock().connect_succeeds = false;
        link
    }

    /// Set the reading returned by `read_detector`.
    pub fn with_reading(self, value: f64, gain: u8) -> Self {
        self.set_reading(value, gain);
        self
    }

    /// Add `step` to the reported value after every read.
    pub fn with_ramp(self, step: f64) -> Self {
        self.lock().ramp_step = step;
        self
    }

    /// Change the reading returned by `read_detector`.
    pub fn set_reading(&self, value: f64, gain: u8) {
        self.lock().reading = DetectorReading { value, gain };
    }

    /// Change the serial the unit reports. Takes effect on the next `connect`.
    pub fn set_serial(&self, serial: impl Into<String>) {
        self.lock().serial = serial.into();
    }

    /// Fail the next non-connect command with `fault`. Injections queue up.
    pub fn inject_next_failure(&self, fault: LinkFault) {
        self.lock().injected.push_back(fault);
    }

    /// Simulate the unit vanishing (`true`) or coming back (`false`).
    pub fn set_device_gone(&self, gone: bool) {
        let mut state = self.lock();
        state.gone = gone;
        if gone {
            state.attached = false;
        }
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Number of `connect` calls made so far.
    pub fn connect_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::Connect))
            .count()
    }

    /// Number of device commands (anything but connect, serial query and disconnect).
    pub fn command_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| {
                !matches!(
                    c,
                    MockCall::Connect | MockCall::SerialNumber | MockCall::Disconnect
                )
            })
            .count()
    }

    /// Forget every recorded call.
    pub fn clear_log(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `call` and decide its outcome.
    fn command(&self, call: MockCall) -> LinkResult<()> {
        let mut state = self.lock();
        state.calls.push(call);
        if let Some(fault) = state.injected.pop_front() {
            if fault == LinkFault::DeviceNotConnected {
                state.attached = false;
            }
            return Err(fault);
        }
        if state.gone || !state.attached {
            return Err(LinkFault::DeviceNotConnected);
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceLink for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&mut self) -> bool {
        let mut state = self.lock();
        state.calls.push(MockCall::Connect);
        if state.connect_succeeds && !state.gone {
            state.attached = true;
        }
        state.attached
    }

    async fn serial_number(&mut self) -> String {
        let mut state = self.lock();
        state.calls.push(MockCall::SerialNumber);
        if state.attached {
            state.serial.clone()
        } else {
            String::new()
        }
    }

    async fn turn_on_channel(&mut self, channel: u8, amps: f64) -> LinkResult<()> {
        self.command(MockCall::TurnOnChannel { channel, amps })
    }

    async fn turn_all_off(&mut self) -> LinkResult<()> {
        self.command(MockCall::TurnAllOff)
    }

    async fn read_detector(&mut self) -> LinkResult<DetectorReading> {
        self.command(MockCall::ReadDetector)?;
        let mut state = self.lock();
        let reading = state.reading;
        state.reading.value += state.ramp_step;
        Ok(reading)
    }

    async fn zero(&mut self) -> LinkResult<()> {
        self.command(MockCall::Zero)
    }

    async fn set_auto_gain(&mut self) -> LinkResult<()> {
        self.command(MockCall::SetAutoGain)
    }

    async fn set_manual_gain(&mut self, gain: u8) -> LinkResult<()> {
        self.command(MockCall::SetManualGain(gain))
    }

    async fn set_line_frequency(&mut self, frequency: LineFrequency) -> LinkResult<()> {
        self.command(MockCall::SetLineFrequency(frequency))
    }

    async fn disconnect(&mut self) {
        let mut state = self.lock();
        state.calls.push(MockCall::Disconnect);
        state.attached = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_adapter_connect() {
        let mut link = MockAdapter::new("1266");
        assert_eq!(link.serial_number().await, "");
        assert!(link.connect().await);
        assert_eq!(link.serial_number().await, "1266");
    }

    #[tokio::test]
    async fn test_mock_adapter_unavailable() {
        let mut link = MockAdapter::unavailable();
        assert!(!link.connect().await);
        assert_eq!(link.zero().await, Err(LinkFault::DeviceNotConnected));
    }

    #[tokio::test]
    async fn test_mock_adapter_failure_injection() {
        let mut link = MockAdapter::new("0105");
        link.connect().await;
        link.inject_next_failure(LinkFault::WrongResponse);
        assert_eq!(link.zero().await, Err(LinkFault::WrongResponse));
        // Failure should be consumed
        assert_eq!(link.zero().await, Ok(()));
    }

    #[tokio::test]
    async fn test_mock_adapter_ramp() {
        let mut link = MockAdapter::new("0105").with_reading(1.0, 2).with_ramp(0.5);
        link.connect().await;
        assert_eq!(link.read_detector().await.unwrap().value, 1.0);
        assert_eq!(link.read_detector().await.unwrap().value, 1.5);
    }

    #[tokio::test]
    async fn test_mock_adapter_call_logging() {
        let handle = MockAdapter::new("0105");
        let mut link = handle.clone();
        link.connect().await;
        link.set_manual_gain(4).await.unwrap();
        link.disconnect().await;

        assert_eq!(
            handle.calls(),
            vec![
                MockCall::Connect,
                MockCall::SetManualGain(4),
                MockCall::Disconnect
            ]
        );
        assert_eq!(handle.command_count(), 1);
        assert_eq!(handle.connect_count(), 1);
        handle.clear_log();
        assert_eq!(handle.call_count(), 0);
    }
}
