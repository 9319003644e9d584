//! In-process stand-in for the hardware layer, used when the native library is
//! not linked. Behaves like a well-mannered PLC and camera on a bench.

use std::{
    fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard},
    thread,
    time::Duration,
};

use log::{debug, info};
use rand::Rng;

use super::{DeviceGateway, GatewayError, Light};

#[derive(Debug, Default)]
struct BenchState {
    plc: Option<(String, u16)>,
    camera: Option<u32>,
    lights: [bool; 4],
}

pub struct SimulatedGateway {
    image_dir: PathBuf,
    state: Mutex<BenchState>,
}

impl SimulatedGateway {
    pub fn new(image_dir: impl Into<PathBuf>) -> Self {
        Self {
            image_dir: image_dir.into(),
            state: Mutex::new(BenchState::default()),
        }
    }

    /// Current output levels in `Light::ALL` order.
    pub fn light_levels(&self) -> [bool; 4] {
        self.lock().lights
    }

    fn lock(&self) -> MutexGuard<'_, BenchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn light_index(light: Light) -> usize {
    match light {
        Light::Top => 0,
        Light::Right => 1,
        Light::Bottom => 2,
        Light::Left => 3,
    }
}

impl DeviceGateway for SimulatedGateway {
    fn connect(&self, address: &str, port: u16) -> Result<(), GatewayError> {
        if address.trim().is_empty() || port == 0 {
            return Err(GatewayError::ConnectFailed {
                address: address.to_string(),
                port,
            });
        }
        info!("Simulated PLC connected at {address}:{port}");
        self.lock().plc = Some((address.to_string(), port));
        Ok(())
    }

    fn disconnect(&self) {
        let mut state = self.lock();
        state.plc = None;
        state.lights = [false; 4];
    }

    fn open_camera(&self, device_index: u32) -> Result<(), GatewayError> {
        fs::create_dir_all(&self.image_dir)
            .map_err(|err| GatewayError::Native(format!("cannot create image dir: {err}")))?;
        self.lock().camera = Some(device_index);
        Ok(())
    }

    fn close_camera(&self) {
        self.lock().camera = None;
    }

    fn is_plc_connected(&self) -> Result<bool, GatewayError> {
        Ok(self.lock().plc.is_some())
    }

    fn is_camera_connected(&self) -> Result<bool, GatewayError> {
        Ok(self.lock().camera.is_some())
    }

    fn read_machine_code(&self) -> Result<i32, GatewayError> {
        let state = self.lock();
        if state.plc.is_none() {
            return Err(GatewayError::PlcNotConnected);
        }
        Ok(if state.lights.iter().any(|on| *on) { 1 } else { 0 })
    }

    fn set_light_output(&self, light: Light, on: bool) -> Result<(), GatewayError> {
        let mut state = self.lock();
        if state.plc.is_none() {
            return Err(GatewayError::PlcNotConnected);
        }
        state.lights[light_index(light)] = on;
        Ok(())
    }

    fn capture_image(&self, filename: &str) -> Result<bool, GatewayError> {
        if filename.contains(['/', '\\']) {
            return Err(GatewayError::InvalidArgument(format!(
                "filename must not contain path separators: {filename}"
            )));
        }
        if self.lock().camera.is_none() {
            return Ok(false);
        }

        // Exposure plus transfer time of a real frame grab.
        let exposure_ms = rand::thread_rng().gen_range(20..80);
        thread::sleep(Duration::from_millis(exposure_ms));

        let path = self.image_dir.join(filename);
        fs::write(&path, b"BM")
            .map_err(|err| GatewayError::Native(format!("failed to save {}: {err}", path.display())))?;
        debug!("Simulated capture saved {} after {exposure_ms}ms", path.display());
        Ok(true)
    }
}
