//! Startup sequence and periodic polling of both Starlight roles.
//!
//! [`startup`] resolves roles, applies the configured detector and light-source
//! settings once, and takes an initial reading per role. [`Monitor::run`] then reads
//! role A and role B on every tick and publishes a [`Snapshot`] to subscribers.
//!
//! Reads within a tick are sequential, and ticks never overlap: a tick that comes
//! due while the previous one is still reading is skipped. Read failures are logged
//! and reported in the snapshot; the loop keeps going.

use crate::config::StartupConfig;
use crate::error::DeviceResult;
use crate::instrument::DeviceOrchestrator;
use crate::types::{DetectorReading, Role};
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Outcome of reading one role.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleReading {
    /// Role that was read
    pub role: Role,
    /// Serial number bound to the role when the read started
    pub serial: Option<String>,
    /// The reading, or why there is none
    pub reading: DeviceResult<DetectorReading>,
}

impl fmt::Display for RoleReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let serial = self.serial.as_deref().unwrap_or(crate::types::DISCONNECTED_LABEL);
        match &self.reading {
            Ok(reading) => write!(f, "[{} {}] {}", self.role, serial, reading),
            Err(e) => write!(f, "[{} {}] error: {}", self.role, serial, e),
        }
    }
}

/// Readings of both roles from one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Poll counter, starting at 1
    pub tick: u64,
    /// When the poll finished
    pub timestamp: DateTime<Utc>,
    /// Role A first, then role B
    pub readings: [RoleReading; 2],
}

impl Snapshot {
    /// Entry for `role`.
    pub fn get(&self, role: Role) -> &RoleReading {
        match role {
            Role::A => &self.readings[0],
            Role::B => &self.readings[1],
        }
    }
}

/// What the display layer needs once roles are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct StartupReport {
    /// Role A first, then role B
    pub readings: [RoleReading; 2],
}

impl StartupReport {
    /// Entry for `role`.
    pub fn get(&self, role: Role) -> &RoleReading {
        match role {
            Role::A => &self.readings[0],
            Role::B => &self.readings[1],
        }
    }
}

/// Resolve roles, apply startup settings, and take one reading per role.
///
/// Setup and command failures abort startup. Read failures are returned in the
/// report instead.
pub async fn startup(
    orchestrator: &mut DeviceOrchestrator,
    plan: &StartupConfig,
) -> DeviceResult<StartupReport> {
    orchestrator.setup().await?;

    for role in Role::ALL {
        let device = orchestrator.device_mut(role)?;
        if let Some(frequency) = plan.line_frequency {
            device.set_detector_line_frequency(frequency).await?;
        }
        if let Some(gain) = plan.gain {
            device.set_detector_gain(gain).await?;
        }
    }

    for setting in &plan.light_sources {
        orchestrator
            .device_mut(setting.role)?
            .apply(setting.command())
            .await?;
        info!(
            role = %setting.role,
            channel = setting.channel,
            current_amps = setting.current_amps,
            "Light source set"
        );
    }

    let readings = [
        read_role(orchestrator, Role::A).await,
        read_role(orchestrator, Role::B).await,
    ];
    Ok(StartupReport { readings })
}

async fn read_role(orchestrator: &mut DeviceOrchestrator, role: Role) -> RoleReading {
    let serial = orchestrator.serial_number(role).ok().map(str::to_string);
    let reading = orchestrator.read(role).await;
    RoleReading {
        role,
        serial,
        reading,
    }
}

/// Periodic reader for both roles.
pub struct Monitor {
    orchestrator: DeviceOrchestrator,
    interval: Duration,
    tx: broadcast::Sender<Snapshot>,
    tick: u64,
    tick_limit: Option<u64>,
}

impl Monitor {
    /// `capacity` bounds how many snapshots a slow subscriber may lag behind.
    pub fn new(orchestrator: DeviceOrchestrator, interval: Duration, capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            orchestrator,
            interval,
            tx,
            tick: 0,
            tick_limit: None,
        }
    }

    /// Stop [`Monitor::run`] after `ticks` polls.
    pub fn with_tick_limit(mut self, ticks: u64) -> Self {
        self.tick_limit = Some(ticks);
        self
    }

    /// New receiver for every snapshot published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Orchestrator being polled.
    pub fn orchestrator(&self) -> &DeviceOrchestrator {
        &self.orchestrator
    }

    /// Mutable orchestrator, for commands between runs.
    pub fn orchestrator_mut(&mut self) -> &mut DeviceOrchestrator {
        &mut self.orchestrator
    }

    /// Stop owning the orchestrator. Closes the snapshot channel.
    pub fn into_orchestrator(self) -> DeviceOrchestrator {
        self.orchestrator
    }

    /// Read role A then role B and publish the snapshot.
    pub async fn poll_once(&mut self) -> Snapshot {
        self.tick += 1;
        let readings = [
            read_role(&mut self.orchestrator, Role::A).await,
            read_role(&mut self.orchestrator, Role::B).await,
        ];

        for entry in &readings {
            if let Err(e) = &entry.reading {
                warn!(role = %entry.role, tick = self.tick, "Poll failed: {}", e);
            }
        }

        let snapshot = Snapshot {
            tick: self.tick,
            timestamp: Utc::now(),
            readings,
        };
        if self.tx.send(snapshot.clone()).is_err() {
            debug!("No active receivers for snapshot {}", snapshot.tick);
        }
        snapshot
    }

    /// Poll at the configured interval until `shutdown` completes or the tick
    /// limit is reached. Returns the number of polls made.
    pub async fn run<F>(&mut self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(interval_ms = self.interval.as_millis() as u64, "Monitor started");
        let mut polls = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, monitor stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.poll_once().await;
                    polls += 1;
                    if self.tick_limit.is_some_and(|limit| polls >= limit) {
                        info!(polls, "Tick limit reached, monitor stopping");
                        break;
                    }
                }
            }
        }
        polls
    }
}
