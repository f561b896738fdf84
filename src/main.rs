//! CLI Entry Point for starlight_monitor
//!
//! Brings up both Starlight units, applies the startup settings, and logs
//! detector readings for each role until interrupted.
//!
//! # Usage
//!
//! Against hardware:
//! ```bash
//! starlight_monitor --config config/starlight.toml
//! ```
//!
//! Without hardware (two simulated units, connected in reverse order):
//! ```bash
//! starlight_monitor --simulate --ticks 10
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use starlight_daq::adapters::{DeviceLink, MockAdapter};
use starlight_daq::config::Settings;
use starlight_daq::instrument::{DeviceController, DeviceOrchestrator};
use starlight_daq::monitor::{self, Monitor};
use starlight_daq::types::Role;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "starlight_monitor")]
#[command(about = "Monitor a pair of Starlight light-source / detector units", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = starlight_daq::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use simulated units instead of serial hardware
    #[arg(long)]
    simulate: bool,

    /// Stop after this many polls
    #[arg(long)]
    ticks: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.application.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting {}", settings.application.name);

    let (first, second) = links(&settings, cli.simulate)?;
    let mut orchestrator = build_orchestrator(&settings, first, second);

    let report = monitor::startup(&mut orchestrator, &settings.startup)
        .await
        .context("Starlight startup failed")?;
    for role in Role::ALL {
        info!(
            label = %settings.roles.get(role).label,
            "Initial reading {}",
            report.get(role)
        );
    }

    let mut monitor = Monitor::new(
        orchestrator,
        settings.poll_interval(),
        settings.polling.channel_capacity,
    );
    if let Some(ticks) = cli.ticks {
        monitor = monitor.with_tick_limit(ticks);
    }

    let mut snapshots = monitor.subscribe();
    let labels = settings.roles.clone();
    let printer = tokio::spawn(async move {
        loop {
            match snapshots.recv().await {
                Ok(snapshot) => {
                    for entry in &snapshot.readings {
                        info!(
                            tick = snapshot.tick,
                            label = %labels.get(entry.role).label,
                            "{}",
                            entry
                        );
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!("Display fell behind by {} snapshots", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let polls = monitor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    let mut orchestrator = monitor.into_orchestrator();
    for role in Role::ALL {
        if let Ok(device) = orchestrator.device_mut(role) {
            if let Err(e) = device.turn_off_all_light_sources().await {
                warn!(%role, "Could not turn off light sources: {}", e);
            }
            device.disconnect().await;
        }
    }

    // The sender is gone once the monitor is dropped above
    if let Err(e) = printer.await {
        warn!("Snapshot printer ended abnormally: {}", e);
    }
    info!(polls, "Stopped");
    Ok(())
}

/// Controllers are named after their link; which role each one serves is only
/// known after setup.
fn build_orchestrator(
    settings: &Settings,
    first: Box<dyn DeviceLink>,
    second: Box<dyn DeviceLink>,
) -> DeviceOrchestrator {
    DeviceOrchestrator::new(
        DeviceController::new("link 1", first),
        DeviceController::new("link 2", second),
        settings.role_serials(),
    )
}

/// The two links in connection order.
fn links(settings: &Settings, simulate: bool) -> Result<(Box<dyn DeviceLink>, Box<dyn DeviceLink>)> {
    if simulate {
        info!("Using simulated Starlight units");
        // Deliberately reversed so role resolution has to swap them
        let b = MockAdapter::new(settings.roles.b.serial.clone())
            .with_reading(0.25, 2)
            .with_ramp(0.01);
        let a = MockAdapter::new(settings.roles.a.serial.clone())
            .with_reading(1.5, 3)
            .with_ramp(-0.01);
        return Ok((Box::new(b), Box::new(a)));
    }
    serial_links(settings)
}

#[cfg(feature = "instrument_serial")]
fn serial_links(settings: &Settings) -> Result<(Box<dyn DeviceLink>, Box<dyn DeviceLink>)> {
    use starlight_daq::adapters::SerialAdapter;

    let config = settings.serial_link_config();
    Ok((
        Box::new(SerialAdapter::new(config.clone())),
        Box::new(SerialAdapter::new(config)),
    ))
}

#[cfg(not(feature = "instrument_serial"))]
fn serial_links(_settings: &Settings) -> Result<(Box<dyn DeviceLink>, Box<dyn DeviceLink>)> {
    anyhow::bail!("built without the 'instrument_serial' feature; run with --simulate")
}
