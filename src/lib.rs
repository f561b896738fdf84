//! Core library for the starlight_daq application.
//!
//! Control and monitoring for a pair of Starlight units, each combining a
//! multi-channel light source with a picoammeter detector. The units are
//! physically identical, so the library resolves which unit is which by serial
//! number before any command is issued, and then addresses them only by role.
//!
//! Layers, bottom up:
//! - [`adapters`]: the vendor link ([`adapters::DeviceLink`]) with serial and mock
//!   implementations
//! - [`instrument`]: per-unit [`instrument::DeviceController`] with fault mapping,
//!   and the [`instrument::DeviceOrchestrator`] that binds units to roles
//! - [`monitor`]: startup sequence and periodic polling
//!
//! Values crossing the public API are checked against [`limits`] before anything
//! is sent to hardware.

pub mod adapters;
pub mod config;
pub mod error;
pub mod instrument;
pub mod limits;
pub mod monitor;
pub mod types;

pub use error::{DeviceError, DeviceResult, FaultKind, Operation};
pub use instrument::{DeviceController, DeviceOrchestrator, RoleSerials, SetupState};
pub use monitor::{Monitor, Snapshot};
pub use types::{ChannelCommand, DetectorReading, DeviceIdentity, GainMode, LineFrequency, Role};
