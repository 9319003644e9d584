pub mod controller;
pub mod loop_worker;
pub mod reconciler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gateway::MachineCode;

pub use controller::StatusMonitor;
pub use reconciler::{DeviceReading, StatusReconciler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceKind {
    Plc,
    Camera,
}

/// One reconciled view of both devices, published once per poll tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    pub plc_connected: bool,
    pub camera_connected: bool,
    /// Always `Unknown` while the PLC is disconnected.
    pub machine_code: MachineCode,
    pub polled_at: DateTime<Utc>,
}

impl DeviceStatus {
    pub fn offline() -> Self {
        Self {
            plc_connected: false,
            camera_connected: false,
            machine_code: MachineCode::Unknown,
            polled_at: Utc::now(),
        }
    }

    pub fn display(&self) -> StatusDisplay {
        if !self.plc_connected {
            StatusDisplay::Disconnected
        } else if !self.camera_connected {
            StatusDisplay::CameraDisconnected
        } else if self.machine_code == MachineCode::Running {
            StatusDisplay::Running
        } else {
            StatusDisplay::Connected
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusDisplay {
    Disconnected,
    CameraDisconnected,
    Running,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StatusSeverity {
    Offline,
    Warning,
    Active,
    Idle,
}

impl StatusDisplay {
    pub fn label(self) -> &'static str {
        match self {
            StatusDisplay::Disconnected => "Disconnected",
            StatusDisplay::CameraDisconnected => "Camera Disconnected",
            StatusDisplay::Running => "Running",
            StatusDisplay::Connected => "Connected",
        }
    }

    pub fn severity(self) -> StatusSeverity {
        match self {
            StatusDisplay::Disconnected => StatusSeverity::Offline,
            StatusDisplay::CameraDisconnected => StatusSeverity::Warning,
            StatusDisplay::Running => StatusSeverity::Active,
            StatusDisplay::Connected => StatusSeverity::Idle,
        }
    }
}
