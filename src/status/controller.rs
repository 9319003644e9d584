use std::{sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{loop_worker::polling_loop, DeviceStatus, StatusReconciler};

/// Owns the polling task and the channel its snapshots are published on.
///
/// The channel outlives individual start/stop cycles so subscribers taken
/// before `start` keep receiving after a reconnect.
pub struct StatusMonitor {
    status_tx: Arc<watch::Sender<DeviceStatus>>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl StatusMonitor {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(DeviceStatus::offline());
        Self {
            status_tx: Arc::new(status_tx),
            handle: None,
            cancel_token: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceStatus> {
        self.status_tx.subscribe()
    }

    pub fn current(&self) -> DeviceStatus {
        self.status_tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, reconciler: StatusReconciler, interval: Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("status polling already active");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(polling_loop(
            reconciler,
            Arc::clone(&self.status_tx),
            interval,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Stops polling and publishes an offline snapshot so admission checks
    /// stop trusting the last live reading.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let joined = match self.handle.take() {
            Some(handle) => handle
                .await
                .context("status polling task failed to join"),
            None => Ok(()),
        };

        self.status_tx.send_replace(DeviceStatus::offline());
        info!("Status polling stopped");
        joined
    }
}

impl Default for StatusMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingGateway, RecordingNotifier};

    #[tokio::test]
    async fn publishes_snapshots_until_stopped() {
        let gateway = Arc::new(RecordingGateway::new());
        gateway.set_plc_connected(true);
        gateway.set_camera_connected(true);
        let notifier = Arc::new(RecordingNotifier::default());

        let mut monitor = StatusMonitor::new();
        let mut rx = monitor.subscribe();
        assert!(!monitor.current().plc_connected);

        let reconciler = StatusReconciler::new(
            gateway.clone(),
            notifier.clone(),
            Duration::from_secs(1),
            false,
        );
        monitor.start(reconciler, Duration::from_millis(10)).unwrap();
        assert!(monitor.is_running());

        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.plc_connected))
            .await
            .expect("no connected snapshot published")
            .unwrap();

        monitor.stop().await.unwrap();
        assert!(!monitor.is_running());
        assert!(!monitor.current().plc_connected);
        assert_eq!(notifier.events().len(), 1);
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let gateway = Arc::new(RecordingGateway::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut monitor = StatusMonitor::new();

        let first = StatusReconciler::new(gateway.clone(), notifier.clone(), Duration::from_secs(1), false);
        let second = StatusReconciler::new(gateway, notifier, Duration::from_secs(1), false);

        monitor.start(first, Duration::from_millis(50)).unwrap();
        assert!(monitor.start(second, Duration::from_millis(50)).is_err());
        monitor.stop().await.unwrap();
    }
}
