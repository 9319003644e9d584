//! Capability boundary over the PLC and camera.
//!
//! Every call is synchronous and may block on device I/O, so async callers go
//! through [`call_blocking`], which moves the call onto tokio's blocking pool.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;

#[cfg(feature = "native")]
pub mod native;
pub mod simulated;

#[cfg(feature = "native")]
pub use native::NativeGateway;
pub use simulated::SimulatedGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Light {
    Top,
    Right,
    Bottom,
    Left,
}

impl Light {
    /// Fixed order used both for actuation and for building file tags.
    pub const ALL: [Light; 4] = [Light::Top, Light::Right, Light::Bottom, Light::Left];

    pub fn initial(self) -> char {
        match self {
            Light::Top => 'T',
            Light::Right => 'R',
            Light::Bottom => 'B',
            Light::Left => 'L',
        }
    }

    pub fn from_initial(initial: char) -> Option<Self> {
        match initial.to_ascii_uppercase() {
            'T' => Some(Light::Top),
            'R' => Some(Light::Right),
            'B' => Some(Light::Bottom),
            'L' => Some(Light::Left),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MachineCode {
    Idle,
    Running,
    Paused,
    Error,
    Unknown,
}

impl MachineCode {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => MachineCode::Idle,
            1 => MachineCode::Running,
            2 => MachineCode::Paused,
            3 => MachineCode::Error,
            _ => MachineCode::Unknown,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("PLC is not connected")]
    PlcNotConnected,
    #[error("camera is not connected")]
    CameraNotConnected,
    #[error("failed to connect to PLC at {address}:{port}")]
    ConnectFailed { address: String, port: u16 },
    #[error("failed to open camera {index}")]
    CameraOpenFailed { index: u32 },
    #[error("invalid argument for native call: {0}")]
    InvalidArgument(String),
    #[error("native layer fault: {0}")]
    Native(String),
}

/// Hardware operations the station consumes.
///
/// Query calls may run concurrently with each other and with one actuation
/// call; two actuation calls must never overlap. The scan sequencer's
/// single-flight flag is what upholds the second rule.
pub trait DeviceGateway: Send + Sync {
    fn connect(&self, address: &str, port: u16) -> Result<(), GatewayError>;

    fn disconnect(&self);

    fn open_camera(&self, device_index: u32) -> Result<(), GatewayError>;

    fn close_camera(&self);

    fn is_plc_connected(&self) -> Result<bool, GatewayError>;

    fn is_camera_connected(&self) -> Result<bool, GatewayError>;

    /// Raw status register: 0 Idle, 1 Running, 2 Paused, 3 Error.
    fn read_machine_code(&self) -> Result<i32, GatewayError>;

    fn set_light_output(&self, light: Light, on: bool) -> Result<(), GatewayError>;

    /// `Ok(false)` means the camera did not deliver a frame in time.
    fn capture_image(&self, filename: &str) -> Result<bool, GatewayError>;
}

/// Starts a gateway call on the blocking pool and hands back its handle.
///
/// Callers that may give up waiting keep the handle so they can tell when the
/// device call has actually returned.
pub fn spawn_gateway_call<T, F>(
    gateway: &Arc<dyn DeviceGateway>,
    call: F,
) -> JoinHandle<Result<T, GatewayError>>
where
    T: Send + 'static,
    F: FnOnce(&dyn DeviceGateway) -> Result<T, GatewayError> + Send + 'static,
{
    let gateway = Arc::clone(gateway);
    tokio::task::spawn_blocking(move || call(gateway.as_ref()))
}

/// Runs a gateway call on the blocking pool.
///
/// The outer `Result` carries join failures (a panicking native call); the
/// inner one is the gateway's own verdict.
pub async fn call_blocking<T, F>(
    gateway: &Arc<dyn DeviceGateway>,
    call: F,
) -> Result<Result<T, GatewayError>>
where
    T: Send + 'static,
    F: FnOnce(&dyn DeviceGateway) -> Result<T, GatewayError> + Send + 'static,
{
    spawn_gateway_call(gateway, call)
        .await
        .context("gateway worker join failed")
}
