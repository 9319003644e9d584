use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::{
    gateway::{spawn_gateway_call, DeviceGateway, GatewayError, MachineCode},
    notify::Notifier,
};

use super::{DeviceKind, DeviceStatus};

// Per-tick logging is at debug level; info only fires on label changes.
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Raw answers from one round of gateway queries, errors already folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceReading {
    pub plc_connected: bool,
    pub camera_connected: bool,
    /// Only queried while the PLC reports connected.
    pub machine_code: Option<i32>,
}

impl DeviceReading {
    pub const OFFLINE: DeviceReading = DeviceReading {
        plc_connected: false,
        camera_connected: false,
        machine_code: None,
    };
}

type PendingRead = JoinHandle<Result<DeviceReading, GatewayError>>;

pub struct StatusReconciler {
    gateway: Arc<dyn DeviceGateway>,
    notifier: Arc<dyn Notifier>,
    poll_timeout: Duration,
    notify_camera_transitions: bool,
    previous: Option<DeviceStatus>,
    /// A read that overran `poll_timeout` and has not returned yet.
    overrun: Option<PendingRead>,
}

impl StatusReconciler {
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        notifier: Arc<dyn Notifier>,
        poll_timeout: Duration,
        notify_camera_transitions: bool,
    ) -> Self {
        Self {
            gateway,
            notifier,
            poll_timeout,
            notify_camera_transitions,
            previous: None,
            overrun: None,
        }
    }

    /// Queries both devices and folds the answers into a new snapshot.
    ///
    /// Never fails: a gateway error, a panicking native call, or a poll that
    /// overruns the timeout all count as "disconnected" for this tick. At most
    /// one device read is outstanding; while an overrun read is still blocked
    /// in the gateway, ticks report offline without starting another.
    pub async fn poll(&mut self) -> DeviceStatus {
        let reading = self.read().await;
        self.reconcile(reading)
    }

    async fn read(&mut self) -> DeviceReading {
        if let Some(overrun) = self.overrun.take() {
            if !overrun.is_finished() {
                log_debug!("previous device poll still blocked; skipping this tick");
                self.overrun = Some(overrun);
                return DeviceReading::OFFLINE;
            }
            if let Err(err) = overrun.await {
                log_debug!("overrun device poll worker failed: {err}");
            }
        }

        let mut read = spawn_gateway_call(&self.gateway, |gateway| Ok(read_devices(gateway)));

        match tokio::time::timeout(self.poll_timeout, &mut read).await {
            Ok(Ok(Ok(reading))) => reading,
            Ok(Ok(Err(err))) => {
                log_debug!("device poll failed: {err}");
                DeviceReading::OFFLINE
            }
            Ok(Err(err)) => {
                log_debug!("device poll worker failed: {err}");
                DeviceReading::OFFLINE
            }
            Err(_) => {
                log_debug!("device poll timed out after {:?}", self.poll_timeout);
                self.overrun = Some(read);
                DeviceReading::OFFLINE
            }
        }
    }

    /// Derives the snapshot for `reading` and emits connectivity edges
    /// relative to the previous tick.
    pub fn reconcile(&mut self, reading: DeviceReading) -> DeviceStatus {
        let machine_code = match (reading.plc_connected, reading.machine_code) {
            (true, Some(raw)) => MachineCode::from_raw(raw),
            _ => MachineCode::Unknown,
        };

        let status = DeviceStatus {
            plc_connected: reading.plc_connected,
            camera_connected: reading.camera_connected,
            machine_code,
            polled_at: Utc::now(),
        };

        let (was_plc, was_camera) = self
            .previous
            .as_ref()
            .map(|prev| (prev.plc_connected, prev.camera_connected))
            .unwrap_or((false, false));

        if status.plc_connected && !was_plc {
            self.notifier.connectivity_restored(DeviceKind::Plc);
        }
        if self.notify_camera_transitions && status.camera_connected && !was_camera {
            self.notifier.connectivity_restored(DeviceKind::Camera);
        }

        let label_changed = self
            .previous
            .as_ref()
            .map_or(true, |prev| prev.display() != status.display());
        if label_changed {
            log_info!("Machine status: {}", status.display().label());
        }

        self.previous = Some(status.clone());
        status
    }
}

fn read_devices(gateway: &dyn DeviceGateway) -> DeviceReading {
    let plc_connected = gateway
        .is_plc_connected()
        .unwrap_or_else(|err| query_failed("PLC connectivity", err));
    let camera_connected = gateway
        .is_camera_connected()
        .unwrap_or_else(|err| query_failed("camera connectivity", err));

    let machine_code = if plc_connected {
        match gateway.read_machine_code() {
            Ok(raw) => Some(raw),
            Err(err) => {
                log_debug!("machine code read failed: {err}");
                None
            }
        }
    } else {
        None
    };

    DeviceReading {
        plc_connected,
        camera_connected,
        machine_code,
    }
}

fn query_failed(what: &str, err: GatewayError) -> bool {
    log_debug!("{what} query failed: {err}");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::StationEvent;
    use crate::status::StatusDisplay;
    use crate::testing::{RecordingGateway, RecordingNotifier};

    fn reconciler(
        gateway: Arc<RecordingGateway>,
        notifier: Arc<RecordingNotifier>,
        camera_edges: bool,
    ) -> StatusReconciler {
        StatusReconciler::new(gateway, notifier, Duration::from_secs(1), camera_edges)
    }

    fn reading(plc: bool, camera: bool, code: Option<i32>) -> DeviceReading {
        DeviceReading {
            plc_connected: plc,
            camera_connected: camera,
            machine_code: code,
        }
    }

    #[test]
    fn restored_event_fires_once_per_rising_edge() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut reconciler =
            reconciler(Arc::new(RecordingGateway::new()), notifier.clone(), false);

        let sequence = [false, false, true, true, true, false, false, true, true];
        for plc in sequence {
            reconciler.reconcile(reading(plc, true, Some(0)));
        }

        let restored = notifier
            .events()
            .into_iter()
            .filter(|event| {
                *event
                    == StationEvent::ConnectivityRestored {
                        device: DeviceKind::Plc,
                    }
            })
            .count();
        assert_eq!(restored, 2);
    }

    #[test]
    fn steady_state_emits_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut reconciler =
            reconciler(Arc::new(RecordingGateway::new()), notifier.clone(), false);

        for _ in 0..5 {
            reconciler.reconcile(reading(false, true, None));
        }
        assert!(notifier.events().is_empty());
    }

    #[test]
    fn camera_edges_are_silent_unless_enabled() {
        let notifier = Arc::new(RecordingNotifier::default());
        let mut silent = reconciler(Arc::new(RecordingGateway::new()), notifier.clone(), false);
        silent.reconcile(reading(true, false, Some(0)));
        silent.reconcile(reading(true, true, Some(0)));
        assert_eq!(notifier.events().len(), 1);

        let notifier = Arc::new(RecordingNotifier::default());
        let mut loud = reconciler(Arc::new(RecordingGateway::new()), notifier.clone(), true);
        loud.reconcile(reading(true, false, Some(0)));
        loud.reconcile(reading(true, true, Some(0)));
        assert_eq!(
            notifier.events(),
            vec![
                StationEvent::ConnectivityRestored {
                    device: DeviceKind::Plc
                },
                StationEvent::ConnectivityRestored {
                    device: DeviceKind::Camera
                },
            ]
        );
    }

    #[test]
    fn stale_machine_code_is_dropped_when_plc_goes_away() {
        let mut reconciler = reconciler(
            Arc::new(RecordingGateway::new()),
            Arc::new(RecordingNotifier::default()),
            false,
        );

        let running = reconciler.reconcile(reading(true, true, Some(1)));
        assert_eq!(running.display(), StatusDisplay::Running);

        let offline = reconciler.reconcile(reading(false, true, Some(1)));
        assert_eq!(offline.machine_code, MachineCode::Unknown);
        assert_eq!(offline.display(), StatusDisplay::Disconnected);
    }

    #[tokio::test]
    async fn poll_reads_gateway_state() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.set_plc_connected(true);
        gateway.set_camera_connected(true);
        gateway.set_machine_code(1);

        let notifier = Arc::new(RecordingNotifier::default());
        let mut reconciler = reconciler(gateway, notifier.clone(), false);

        let status = reconciler.poll().await;
        assert!(status.plc_connected);
        assert!(status.camera_connected);
        assert_eq!(status.machine_code, MachineCode::Running);
        assert_eq!(notifier.events().len(), 1);
    }

    #[tokio::test]
    async fn poll_treats_gateway_errors_as_disconnected() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.set_plc_connected(true);
        gateway.set_camera_connected(true);
        gateway.fail_queries(true);

        let mut reconciler = reconciler(
            gateway.clone(),
            Arc::new(RecordingNotifier::default()),
            false,
        );

        let status = reconciler.poll().await;
        assert!(!status.plc_connected);
        assert!(!status.camera_connected);
        assert_eq!(status.display(), StatusDisplay::Disconnected);

        gateway.fail_queries(false);
        assert!(reconciler.poll().await.plc_connected);
    }

    #[tokio::test]
    async fn hung_gateway_never_has_more_than_one_read_outstanding() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.set_plc_connected(true);
        gateway.set_camera_connected(true);
        gateway.hang_queries(Duration::from_millis(300));

        let mut reconciler = StatusReconciler::new(
            gateway.clone(),
            Arc::new(RecordingNotifier::default()),
            Duration::from_millis(20),
            false,
        );

        for _ in 0..10 {
            let status = reconciler.poll().await;
            assert!(!status.plc_connected);
        }
        assert_eq!(gateway.peak_concurrent_queries(), 1);

        gateway.hang_queries(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(400)).await;

        let status = reconciler.poll().await;
        assert!(status.plc_connected);
        assert_eq!(gateway.peak_concurrent_queries(), 1);
    }

    #[tokio::test]
    async fn failed_machine_code_read_keeps_plc_connected() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.set_plc_connected(true);
        gateway.set_camera_connected(true);
        gateway.fail_machine_code(true);

        let mut reconciler = reconciler(gateway, Arc::new(RecordingNotifier::default()), false);
        let status = reconciler.poll().await;
        assert!(status.plc_connected);
        assert_eq!(status.machine_code, MachineCode::Unknown);
        assert_eq!(status.display(), StatusDisplay::Connected);
    }
}
