//! Configuration System using Figment
//!
//! Configuration is loaded from (in order of precedence, last wins):
//! 1. Built-in defaults
//! 2. TOML configuration file (default: `config/starlight.toml`, optional)
//! 3. Environment variables prefixed with `STARLIGHT_`, sections split by `__`
//!
//! # Environment Variable Overrides
//!
//! ```text
//! STARLIGHT_APPLICATION__LOG_LEVEL=debug
//! STARLIGHT_POLLING__INTERVAL_MS=250
//! STARLIGHT_SERIAL__BAUD_RATE=9600
//! ```
//!
//! # Example
//!
//! ```no_run
//! use starlight_daq::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Role A serial: {}", settings.roles.a.serial);
//!     println!("Poll interval: {:?}", settings.poll_interval());
//!     Ok(())
//! }
//! ```

use crate::instrument::RoleSerials;
use crate::limits;
use crate::types::{ChannelCommand, GainMode, LineFrequency, Role};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/starlight.toml";
/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "STARLIGHT_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    /// A provider failed or a value had the wrong type
    LoadError(#[from] figment::Error),
    /// Values parsed but cannot be used
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    /// `[application]`
    pub application: ApplicationConfig,
    /// `[roles.a]` and `[roles.b]`
    pub roles: RolesConfig,
    /// `[polling]`
    pub polling: PollingConfig,
    /// `[serial]`
    pub serial: SerialConfig,
    /// `[startup]`
    pub startup: StartupConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Name shown in the startup log
    pub name: String,
    /// Logging level (trace, debug, info, warn, error), used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Starlight Monitor".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Expected unit for each role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolesConfig {
    /// Role A
    pub a: RoleConfig,
    /// Role B
    pub b: RoleConfig,
}

/// One role's expected unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Serial number the unit reports
    pub serial: String,
    /// Display name
    pub label: String,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            a: RoleConfig {
                serial: "0105".to_string(),
                label: "Starlight 0105".to_string(),
            },
            b: RoleConfig {
                serial: "1266".to_string(),
                label: "Starlight 1266".to_string(),
            },
        }
    }
}

impl RolesConfig {
    /// Settings for `role`.
    pub fn get(&self, role: Role) -> &RoleConfig {
        match role {
            Role::A => &self.a,
            Role::B => &self.b,
        }
    }
}

/// Periodic read settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Time between polls
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Snapshot broadcast capacity
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Line speed for every port
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Response timeout per command
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Ports to scan; empty scans every port
    #[serde(default)]
    pub ports: Vec<String>,
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            ports: Vec::new(),
        }
    }
}

/// One light-source setting applied at startup.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LightSourceSetting {
    /// Unit to drive
    pub role: Role,
    /// Light-source channel, `0..=4`
    pub channel: u8,
    /// Drive current, `0.0..=1.0` A
    pub current_amps: f64,
}

impl LightSourceSetting {
    /// The command this setting issues.
    pub fn command(&self) -> ChannelCommand {
        ChannelCommand::new(self.channel, self.current_amps)
    }
}

/// Commands applied once after roles resolve, before polling starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Applied in order
    #[serde(default)]
    pub light_sources: Vec<LightSourceSetting>,
    /// Gain for both detectors (`"auto"` or a stage `0..=5`); left as-is when unset
    #[serde(default)]
    pub gain: Option<GainMode>,
    /// Mains filter for both detectors; left as-is when unset
    #[serde(default)]
    pub line_frequency: Option<LineFrequency>,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            light_sources: vec![LightSourceSetting {
                role: Role::B,
                channel: 1,
                current_amps: 0.1,
            }],
            gain: None,
            line_frequency: None,
        }
    }
}

impl Settings {
    /// Load from the default file location and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from `path` and the environment. A missing file is not an error.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings: Settings = Self::figment(path.as_ref()).extract()?;
        settings.validate()?;
        Ok(settings)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (a, b) = (self.roles.a.serial.trim(), self.roles.b.serial.trim());
        if a.is_empty() || b.is_empty() {
            return Err(ConfigError::ValidationError(
                "role serial numbers must not be empty".to_string(),
            ));
        }
        if a == b {
            return Err(ConfigError::ValidationError(format!(
                "roles A and B expect the same serial number '{}'",
                a
            )));
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "polling.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.polling.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "polling.channel_capacity must be greater than 0".to_string(),
            ));
        }
        for setting in &self.startup.light_sources {
            setting.command().validate().map_err(|e| {
                ConfigError::ValidationError(format!(
                    "startup light source for role {}: {}",
                    setting.role, e
                ))
            })?;
        }
        if let Some(GainMode::Manual(gain)) = self.startup.gain {
            if gain > limits::MAX_MANUAL_GAIN {
                return Err(ConfigError::ValidationError(format!(
                    "startup gain must be between 0 and {}, got {}",
                    limits::MAX_MANUAL_GAIN,
                    gain
                )));
            }
        }
        Ok(())
    }

    /// Expected serials, trimmed, for the orchestrator.
    pub fn role_serials(&self) -> RoleSerials {
        RoleSerials::new(self.roles.a.serial.trim(), self.roles.b.serial.trim())
    }

    /// `polling.interval_ms` as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.polling.interval_ms)
    }

    /// Port settings for [`crate::adapters::SerialAdapter`].
    #[cfg(feature = "instrument_serial")]
    pub fn serial_link_config(&self) -> crate::adapters::SerialLinkConfig {
        crate::adapters::SerialLinkConfig {
            baud_rate: self.serial.baud_rate,
            timeout: Duration::from_millis(self.serial.timeout_ms),
            ports: self.serial.ports.clone(),
        }
    }

    /// Path that [`Settings::load`] reads.
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.role_serials(), RoleSerials::new("0105", "1266"));
        assert_eq!(settings.poll_interval(), Duration::from_secs(1));
        assert_eq!(settings.startup.light_sources.len(), 1);
    }

    #[test]
    #[serial]
    fn load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[roles.a]
serial = "2001"
label = "left"

[roles.b]
serial = "2002"
label = "right"

[polling]
interval_ms = 250

[startup]
gain = "auto"
line_frequency = "50hz"
light_sources = [
    {{ role = "a", channel = 0, current_amps = 0.25 }},
    {{ role = "b", channel = 4, current_amps = 1.0 }},
]
"#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.roles.a.serial, "2001");
        assert_eq!(settings.roles.b.label, "right");
        assert_eq!(settings.polling.interval_ms, 250);
        assert_eq!(settings.startup.gain, Some(GainMode::Auto));
        assert_eq!(settings.startup.line_frequency, Some(LineFrequency::Hz50));
        assert_eq!(settings.startup.light_sources[1].role, Role::B);
        // Untouched sections keep their defaults
        assert_eq!(settings.serial.baud_rate, 115_200);
    }

    #[test]
    #[serial]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("STARLIGHT_POLLING__INTERVAL_MS", "125");
        let result = Settings::load_from(dir.path().join("absent.toml"));
        std::env::remove_var("STARLIGHT_POLLING__INTERVAL_MS");
        assert_eq!(result.unwrap().polling.interval_ms, 125);
    }

    #[test]
    #[serial]
    fn unsafe_startup_current_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[startup]
light_sources = [{{ role = "b", channel = 1, current_amps = 1.5 }}]
"#
        )
        .unwrap();

        match Settings::load_from(file.path()) {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("current_amps")),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn load_startup(body: &str) -> Result<Settings, ConfigError> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[startup]\n{}", body).unwrap();
        Settings::load_from(file.path())
    }

    #[test]
    #[serial]
    fn startup_gain_accepts_stage_number() {
        let settings = load_startup("gain = 3").unwrap();
        assert_eq!(settings.startup.gain, Some(GainMode::Manual(3)));

        let settings = load_startup("gain = \"Auto\"").unwrap();
        assert_eq!(settings.startup.gain, Some(GainMode::Auto));
    }

    #[test]
    #[serial]
    fn startup_gain_out_of_range_is_rejected() {
        match load_startup("gain = 9") {
            Err(ConfigError::ValidationError(msg)) => assert!(msg.contains("gain"), "{msg}"),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(matches!(
            load_startup("gain = \"loud\""),
            Err(ConfigError::LoadError(_))
        ));
    }

    #[test]
    fn identical_role_serials_are_rejected() {
        let mut settings = Settings::default();
        settings.roles.b.serial = settings.roles.a.serial.clone();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut settings = Settings::default();
        settings.polling.interval_ms = 0;
        assert!(settings.validate().is_err());
    }
}
