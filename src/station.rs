use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};

use crate::{
    db::{Database, ScanRecord},
    gateway::{call_blocking, DeviceGateway},
    notify::{BroadcastNotifier, Notifier, StationEvent},
    operator::OperatorContext,
    recorder::SqliteOutcomeRecorder,
    scan::{AdmissionRejected, ScanSequencer, ScanSummary, SequencerConfig, SequencerSnapshot},
    settings::{PlcEndpoint, SettingsStore},
    status::{DeviceStatus, StatusMonitor, StatusReconciler},
};

const EVENT_CAPACITY: usize = 64;

/// One inspection station: status polling and the scan sequencer share a
/// single gateway, with outcomes going to the scan history.
pub struct Station {
    settings: SettingsStore,
    db: Database,
    gateway: Arc<dyn DeviceGateway>,
    notifier: Arc<BroadcastNotifier>,
    monitor: Mutex<StatusMonitor>,
    status_rx: watch::Receiver<DeviceStatus>,
    sequencer: ScanSequencer,
}

impl Station {
    pub fn new(settings: SettingsStore, db: Database, gateway: Arc<dyn DeviceGateway>) -> Result<Self> {
        let config = SequencerConfig::from_settings(&settings.snapshot().scan)
            .context("invalid scan settings")?;

        let notifier = Arc::new(BroadcastNotifier::new(EVENT_CAPACITY));
        let monitor = StatusMonitor::new();
        let status_rx = monitor.subscribe();

        let sequencer = ScanSequencer::new(
            Arc::clone(&gateway),
            Arc::new(SqliteOutcomeRecorder::new(db.clone())),
            notifier.clone(),
            status_rx.clone(),
            config,
        );

        Ok(Self {
            settings,
            db,
            gateway,
            notifier,
            monitor: Mutex::new(monitor),
            status_rx,
            sequencer,
        })
    }

    /// Connects to the PLC, opens the camera, and starts status polling.
    ///
    /// A camera that fails to open is reported but does not undo the PLC
    /// connection; the status display shows it as "Camera Disconnected".
    pub async fn connect(&self) -> Result<()> {
        let settings = self.settings.snapshot();
        let PlcEndpoint { address, port } = settings.plc.clone();

        info!("Connecting to PLC at {address}:{port}");
        let target = address.clone();
        call_blocking(&self.gateway, move |gateway| gateway.connect(&target, port))
            .await?
            .with_context(|| format!("could not connect to PLC at {address}:{port}"))?;

        let device_index = settings.camera.device_index;
        match call_blocking(&self.gateway, move |gateway| gateway.open_camera(device_index)).await {
            Ok(Ok(())) => info!("Camera {device_index} opened"),
            Ok(Err(err)) => {
                warn!("Camera {device_index} unavailable: {err}");
                self.notifier.warning(&format!("Camera {device_index} unavailable"));
            }
            Err(err) => {
                warn!("Camera open crashed: {err:?}");
                self.notifier.warning(&format!("Camera {device_index} unavailable"));
            }
        }

        let mut monitor = self.monitor.lock().await;
        if !monitor.is_running() {
            let reconciler = StatusReconciler::new(
                Arc::clone(&self.gateway),
                self.notifier.clone(),
                settings.polling.timeout(),
                settings.polling.notify_camera_transitions,
            );
            monitor.start(reconciler, settings.polling.interval())?;
        }

        Ok(())
    }

    /// Stops polling and releases both devices. Safe to call when already
    /// disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        if self.sequencer.is_running() {
            warn!("Disconnecting while a scan is in progress");
        }

        let stopped = self.monitor.lock().await.stop().await;

        call_blocking(&self.gateway, |gateway| {
            gateway.close_camera();
            gateway.disconnect();
            Ok(())
        })
        .await?
        .context("failed to release devices")?;

        info!("Devices disconnected");
        stopped
    }

    pub async fn start_scan(
        &self,
        operator: &OperatorContext,
    ) -> Result<JoinHandle<ScanSummary>, AdmissionRejected> {
        self.sequencer.start_scan(operator).await
    }

    pub async fn set_calibration_lights(&self, operator: &OperatorContext, on: bool) -> Result<()> {
        self.sequencer.set_calibration_lights(operator, on).await
    }

    pub async fn scan_history(&self, limit: usize) -> Result<Vec<ScanRecord>> {
        self.db.list_scan_records(limit).await
    }

    pub fn status(&self) -> DeviceStatus {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceStatus> {
        self.status_rx.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<StationEvent> {
        self.notifier.subscribe()
    }

    pub async fn sequencer(&self) -> SequencerSnapshot {
        self.sequencer.snapshot().await
    }

    pub fn plc_endpoint(&self) -> PlcEndpoint {
        self.settings.plc_endpoint()
    }

    /// Takes effect on the next `connect`.
    pub fn update_plc_endpoint(&self, address: &str, port: u16) -> Result<()> {
        self.settings.update_plc_endpoint(address, port)?;
        info!("PLC endpoint set to {}:{}", address.trim(), port);
        Ok(())
    }

    /// Picks up hand edits to the settings file. Endpoint and polling values
    /// apply on the next `connect`; lighting steps are fixed at startup.
    pub fn reload_settings(&self) -> Result<()> {
        self.settings.reload()?;
        info!("Settings reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        db::{ResultCode, ScanRecordStatus},
        operator::OperatorRole,
        settings::StationSettings,
        testing::{GatewayCall, RecordingGateway},
    };

    struct Fixture {
        station: Station,
        gateway: Arc<RecordingGateway>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.json");

        let mut initial = StationSettings::default();
        initial.polling.interval_ms = 10;
        initial.scan.settle_delay_ms = 1;
        std::fs::write(&path, serde_json::to_string(&initial).unwrap()).unwrap();

        let settings = SettingsStore::new(path).unwrap();
        let db = Database::new(dir.path().join("station.sqlite3")).unwrap();
        let gateway = Arc::new(RecordingGateway::new());
        let station = Station::new(settings, db, gateway.clone()).unwrap();

        Fixture {
            station,
            gateway,
            _dir: dir,
        }
    }

    async fn wait_until_ready(station: &Station) {
        let mut rx = station.subscribe();
        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| s.plc_connected && s.camera_connected),
        )
        .await
        .expect("station never reported both devices")
        .unwrap();
    }

    #[tokio::test]
    async fn connect_scan_and_read_history() {
        let fx = fixture();
        let mut events = fx.station.events();

        fx.station.connect().await.unwrap();
        wait_until_ready(&fx.station).await;
        assert_eq!(
            events.recv().await.unwrap(),
            StationEvent::ConnectivityRestored {
                device: crate::status::DeviceKind::Plc
            }
        );

        let operator = OperatorContext::new("alice", OperatorRole::Operator);
        let summary = fx.station.start_scan(&operator).await.unwrap().await.unwrap();
        assert_eq!(summary.captured_count(), 4);

        let mut history = Vec::new();
        for _ in 0..100 {
            history = fx.station.scan_history(10).await.unwrap();
            if !history.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].initiated_by, "alice");
        assert_eq!(history[0].status, ScanRecordStatus::Completed);
        assert_eq!(history[0].result_code, ResultCode::Success);

        fx.station.disconnect().await.unwrap();
        assert!(!fx.station.status().plc_connected);
        assert!(fx.gateway.calls().contains(&GatewayCall::Disconnect));
    }

    #[tokio::test]
    async fn scans_are_refused_before_connecting() {
        let fx = fixture();
        let operator = OperatorContext::new("alice", OperatorRole::Admin);

        let err = fx.station.start_scan(&operator).await.unwrap_err();
        assert_eq!(err, AdmissionRejected::PlcNotConnected);
        assert!(fx.gateway.light_calls().is_empty());
    }

    #[tokio::test]
    async fn connect_uses_the_configured_endpoint() {
        let fx = fixture();
        fx.station.update_plc_endpoint("10.1.2.3", 5002).unwrap();

        fx.station.connect().await.unwrap();
        assert_eq!(
            fx.gateway.calls()[0],
            GatewayCall::Connect {
                address: "10.1.2.3".into(),
                port: 5002
            }
        );
        assert!(fx.gateway.calls().contains(&GatewayCall::OpenCamera(0)));

        fx.station.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_without_connect_is_harmless() {
        let fx = fixture();
        fx.station.disconnect().await.unwrap();
        assert!(!fx.station.status().plc_connected);
    }
}
