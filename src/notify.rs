use std::{fmt, time::Duration};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::status::DeviceKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationLevel {
    /// How long a toast for this level stays on screen.
    pub fn display_duration(self) -> Duration {
        match self {
            NotificationLevel::Info | NotificationLevel::Success => Duration::from_secs(3),
            NotificationLevel::Warning => Duration::from_secs(4),
            NotificationLevel::Error => Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub duration_ms: u64,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            duration_ms: level.display_duration().as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StationEvent {
    ConnectivityRestored { device: DeviceKind },
    Notification(Notification),
}

impl StationEvent {
    pub fn level(&self) -> NotificationLevel {
        match self {
            StationEvent::ConnectivityRestored { .. } => NotificationLevel::Success,
            StationEvent::Notification(notification) => notification.level,
        }
    }
}

impl fmt::Display for StationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationEvent::ConnectivityRestored {
                device: DeviceKind::Plc,
            } => f.write_str("PLC connected"),
            StationEvent::ConnectivityRestored {
                device: DeviceKind::Camera,
            } => f.write_str("Camera connected"),
            StationEvent::Notification(notification) => f.write_str(&notification.message),
        }
    }
}

/// Sink for everything the core wants an operator to see.
///
/// Implementations must not block; the reconciler calls this from its tick.
pub trait Notifier: Send + Sync {
    fn emit(&self, event: StationEvent);

    fn connectivity_restored(&self, device: DeviceKind) {
        self.emit(StationEvent::ConnectivityRestored { device });
    }

    fn info(&self, message: &str) {
        self.emit(StationEvent::Notification(Notification::new(
            NotificationLevel::Info,
            message,
        )));
    }

    fn success(&self, message: &str) {
        self.emit(StationEvent::Notification(Notification::new(
            NotificationLevel::Success,
            message,
        )));
    }

    fn warning(&self, message: &str) {
        self.emit(StationEvent::Notification(Notification::new(
            NotificationLevel::Warning,
            message,
        )));
    }

    fn error(&self, message: &str) {
        self.emit(StationEvent::Notification(Notification::new(
            NotificationLevel::Error,
            message,
        )));
    }
}

/// Fans events out to any number of subscribers; with none attached events are
/// dropped.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<StationEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn emit(&self, event: StationEvent) {
        let _ = self.tx.send(event);
    }
}
