//! Serial link for Starlight units.
//!
//! Scans the candidate serial ports, attaches to the first one whose device answers
//! the id query, then speaks the frame protocol from [`super::protocol`]. Blocking
//! port I/O runs on Tokio's blocking pool.

use super::protocol::{self, READ_ID};
use super::{DeviceLink, LinkFault, LinkResult};
use crate::types::{DetectorReading, LineFrequency};
use async_trait::async_trait;
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// Port settings used while scanning and talking to a unit.
#[derive(Debug, Clone)]
pub struct SerialLinkConfig {
    /// Baud rate (e.g., 9600, 115200)
    pub baud_rate: u32,
    /// Overall response timeout per command
    pub timeout: Duration,
    /// Ports to try; empty means every port the OS reports
    pub ports: Vec<String>,
}

impl Default for SerialLinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            timeout: Duration::from_millis(1000),
            ports: Vec::new(),
        }
    }
}

/// Serial [`DeviceLink`] implementation.
pub struct SerialAdapter {
    config: SerialLinkConfig,
    /// Name of the attached port, for logs
    port_name: Option<String>,
    serial_number: String,
    port: Option<SharedPort>,
}

impl SerialAdapter {
    /// Unattached link; nothing is opened until `connect`.
    pub fn new(config: SerialLinkConfig) -> Self {
        Self {
            config,
            port_name: None,
            serial_number: String::new(),
            port: None,
        }
    }

    /// Port this link is attached to, if any.
    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    fn candidate_ports(&self) -> Vec<String> {
        if !self.config.ports.is_empty() {
            return self.config.ports.clone();
        }
        match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                warn!("Failed to enumerate serial ports: {}", e);
                Vec::new()
            }
        }
    }

    /// Send `command` and return the response line.
    async fn exchange(&mut self, command: String) -> LinkResult<String> {
        let port = self.port.clone().ok_or(LinkFault::DeviceNotConnected)?;
        let timeout = self.config.timeout;

        let result = tokio::task::spawn_blocking(move || {
            let mut guard = port.blocking_lock();
            transact(&mut **guard, &command, timeout)
        })
        .await
        .map_err(|_| LinkFault::SerialComError)?;

        if result == Err(LinkFault::DeviceNotConnected) {
            self.release();
        }
        result
    }

    /// Send `command` and require the response to echo `prefix`.
    async fn command(&mut self, command: String, prefix: &str) -> LinkResult<()> {
        let response = self.exchange(command).await?;
        protocol::expect_prefix(&response, prefix)
    }

    fn release(&mut self) {
        if let Some(name) = self.port_name.take() {
            debug!("Serial port '{}' released", name);
        }
        self.port = None;
        self.serial_number.clear();
    }
}

/// Write one framed command and read one response line.
fn transact(port: &mut dyn SerialPort, command: &str, timeout: Duration) -> LinkResult<String> {
    port.write_all(protocol::frame(command).as_bytes())
        .map_err(io_fault)?;
    port.flush().map_err(io_fault)?;
    debug!("Sent serial command: {}", command);

    let mut response = Vec::new();
    let mut buffer = [0u8; 1];
    let start = Instant::now();

    loop {
        if start.elapsed() > timeout {
            return Err(LinkFault::SerialComError);
        }

        match port.read(&mut buffer) {
            Ok(1) => {
                let byte = buffer[0];
                if byte == b'\r' || byte == b'\n' {
                    if response.is_empty() {
                        // Leftover line ending from a previous frame
                        continue;
                    }
                    break;
                }
                response.push(byte);
            }
            Ok(_) => return Err(LinkFault::DeviceNotConnected),
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(io_fault(e)),
        }
    }

    let response = String::from_utf8_lossy(&response).trim().to_string();
    debug!("Received serial response: {}", response);
    Ok(response)
}

fn io_fault(e: std::io::Error) -> LinkFault {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
            LinkFault::DeviceNotConnected
        }
        _ => LinkFault::SerialComError,
    }
}

/// Open each port in turn and return the first that answers the id query.
///
/// Ports are opened exclusively, so a port already held by another link fails to
/// open and is skipped.
fn scan_for_responder(
    ports: &[String],
    config: &SerialLinkConfig,
) -> Option<(String, Box<dyn SerialPort>, String)> {
    for name in ports {
        let mut port = match serialport::new(name, config.baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
        {
            Ok(port) => port,
            Err(e) => {
                debug!("Skipping serial port '{}': {}", name, e);
                continue;
            }
        };
        let _ = port.clear(serialport::ClearBuffer::All);

        match transact(&mut *port, READ_ID, config.timeout) {
            Ok(response) => match protocol::parse_serial_number(&response) {
                Some(serial) => return Some((name.clone(), port, serial)),
                None => debug!("Port '{}' answered with a non-Starlight frame", name),
            },
            Err(fault) => debug!("No Starlight device on '{}': {:?}", name, fault),
        }
    }
    None
}

#[async_trait]
impl DeviceLink for SerialAdapter {
    fn name(&self) -> &str {
        "serial"
    }

    async fn connect(&mut self) -> bool {
        if self.port.is_some() {
            return true;
        }

        let ports = self.candidate_ports();
        let config = self.config.clone();
        let scan =
            tokio::task::spawn_blocking(move || scan_for_responder(&ports, &config)).await;

        match scan {
            Ok(Some((name, port, serial))) => {
                debug!(
                    "Serial port '{}' opened at {} baud, device {}",
                    name, self.config.baud_rate, serial
                );
                self.port_name = Some(name);
                self.serial_number = serial;
                self.port = Some(Arc::new(Mutex::new(port)));
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("Serial port scan task failed: {}", e);
                false
            }
        }
    }

    async fn serial_number(&mut self) -> String {
        self.serial_number.clone()
    }

    async fn turn_on_channel(&mut self, channel: u8, amps: f64) -> LinkResult<()> {
        self.command(
            protocol::set_current_command(channel, amps),
            protocol::SET_CURR_RESP,
        )
        .await
    }

    async fn read_detector(&mut self) -> LinkResult<DetectorReading> {
        let response = self.exchange(protocol::READ_PA.to_string()).await?;
        protocol::parse_detector_response(&response)
    }

    async fn zero(&mut self) -> LinkResult<()> {
        self.command(protocol::ZERO_PA.to_string(), protocol::ZERO_PA_RESP)
            .await
    }

    async fn set_auto_gain(&mut self) -> LinkResult<()> {
        self.command(
            protocol::set_gain_command(protocol::GAIN_AUTO_CODE),
            protocol::SET_PA_GAIN_RESP,
        )
        .await
    }

    async fn set_manual_gain(&mut self, gain: u8) -> LinkResult<()> {
        self.command(protocol::set_gain_command(gain), protocol::SET_PA_GAIN_RESP)
            .await
    }

    async fn set_line_frequency(&mut self, frequency: LineFrequency) -> LinkResult<()> {
        let (command, expected) = protocol::line_frequency_frames(frequency);
        let response = self.exchange(command.to_string()).await?;
        protocol::expect_exact(&response, expected)
    }

    async fn disconnect(&mut self) {
        self.release();
    }
}
