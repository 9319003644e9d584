mod utils;

pub mod db;
pub mod gateway;
pub mod notify;
pub mod operator;
pub mod recorder;
pub mod scan;
pub mod settings;
pub mod shell;
pub mod station;
pub mod status;

#[cfg(test)]
mod testing;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;

use db::Database;
use gateway::DeviceGateway;
use notify::{NotificationLevel, StationEvent};
use settings::{SettingsStore, StationSettings};

pub use station::Station;

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var_os(var)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

#[cfg(feature = "native")]
fn build_gateway(settings: &StationSettings) -> Arc<dyn DeviceGateway> {
    info!("Using native device gateway");
    Arc::new(gateway::NativeGateway::new(settings.lights.clone()))
}

#[cfg(not(feature = "native"))]
fn build_gateway(settings: &StationSettings) -> Arc<dyn DeviceGateway> {
    info!(
        "Using simulated device gateway (images in {})",
        settings.camera.image_dir.display()
    );
    Arc::new(gateway::SimulatedGateway::new(settings.camera.image_dir.clone()))
}

/// `info` unless the filter variable (RUST_LOG by default) says otherwise.
fn log_builder(env: env_logger::Env<'_>) -> env_logger::Builder {
    env_logger::Builder::from_env(env.default_filter_or("info"))
}

fn log_event(event: &StationEvent) {
    match event.level() {
        NotificationLevel::Error => error!("{event}"),
        NotificationLevel::Warning => warn!("{event}"),
        NotificationLevel::Info | NotificationLevel::Success => info!("{event}"),
    }
}

pub async fn run() -> Result<()> {
    log_builder(env_logger::Env::default()).init();

    info!("Inspection station starting up...");

    let settings_path = env_path("STATION_SETTINGS", "station.json");
    let settings = SettingsStore::new(settings_path.clone())?;
    if !settings_path.exists() {
        settings.save()?;
        info!("Wrote default settings to {}", settings_path.display());
    }

    let database = Database::new(env_path("STATION_DB", "station.sqlite3"))?;
    let gateway = build_gateway(&settings.snapshot());
    let station = Station::new(settings, database, gateway)?;

    let mut events = station.events();
    let event_log = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!("Event log skipped {skipped} events"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::select! {
        result = shell::run_console(&station) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    if let Err(err) = station.disconnect().await {
        error!("Shutdown disconnect failed: {err:?}");
    }
    event_log.abort();

    info!("Inspection station stopped");
    Ok(())
}
