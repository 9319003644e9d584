use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{DeviceStatus, StatusReconciler};

const ENABLE_LOGS: bool = true;

use crate::log_info;

pub async fn polling_loop(
    mut reconciler: StatusReconciler,
    status_tx: Arc<watch::Sender<DeviceStatus>>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log_info!("status polling loop started ({}ms interval)", interval.as_millis());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let status = reconciler.poll().await;
                status_tx.send_replace(status);
            }
            _ = cancel_token.cancelled() => {
                log_info!("status polling loop shutting down");
                break;
            }
        }
    }
}
