//! FFI binding to the native PLC/camera library.
//!
//! The library keeps its own connection manager thread that reconnects and
//! refreshes the D0 status register every 500 ms; the calls below only read its
//! cached state or enqueue work for it.

use std::ffi::{c_char, c_int, c_void, CString};

use log::{info, warn};

use super::{DeviceGateway, GatewayError, Light};
use crate::settings::LightWiring;

extern "C" {
    #[link_name = "ConnectPlc"]
    fn native_connect_plc(ip_address: *const c_char, port: c_int) -> bool;
    #[link_name = "DisconnectPlc"]
    fn native_disconnect_plc();
    #[link_name = "GetIsConnected"]
    fn native_is_plc_connected() -> bool;
    #[link_name = "GetLastPlcValue"]
    fn native_last_plc_value() -> c_int;
    #[link_name = "SetPlcBit"]
    fn native_set_plc_bit(device: *const c_char, value: c_int);

    #[link_name = "GetCameraCount"]
    fn native_camera_count() -> c_int;
    #[link_name = "StartLiveView"]
    fn native_start_live_view(hwnd: *mut c_void, device_index: c_int);
    #[link_name = "StopLiveView"]
    fn native_stop_live_view();
    #[link_name = "GetIsCameraConnected"]
    fn native_is_camera_connected() -> bool;
    #[link_name = "CaptureImageCustom"]
    fn native_capture_image(filename: *const c_char) -> bool;
}

pub struct NativeGateway {
    wiring: LightWiring,
}

impl NativeGateway {
    pub fn new(wiring: LightWiring) -> Self {
        Self { wiring }
    }
}

fn c_string(value: &str) -> Result<CString, GatewayError> {
    CString::new(value)
        .map_err(|_| GatewayError::InvalidArgument(format!("interior NUL in {value:?}")))
}

impl DeviceGateway for NativeGateway {
    fn connect(&self, address: &str, port: u16) -> Result<(), GatewayError> {
        let c_address = c_string(address)?;
        let connected = unsafe { native_connect_plc(c_address.as_ptr(), c_int::from(port)) };
        if connected {
            info!("Native PLC connection established to {address}:{port}");
            Ok(())
        } else {
            Err(GatewayError::ConnectFailed {
                address: address.to_string(),
                port,
            })
        }
    }

    fn disconnect(&self) {
        unsafe { native_disconnect_plc() }
    }

    fn open_camera(&self, device_index: u32) -> Result<(), GatewayError> {
        let count = unsafe { native_camera_count() };
        let index = c_int::try_from(device_index)
            .map_err(|_| GatewayError::CameraOpenFailed { index: device_index })?;
        if index >= count {
            warn!("Camera {device_index} requested but only {count} enumerated");
            return Err(GatewayError::CameraOpenFailed { index: device_index });
        }

        // Headless: no preview window handle.
        unsafe { native_start_live_view(std::ptr::null_mut(), index) };

        if unsafe { native_is_camera_connected() } {
            Ok(())
        } else {
            Err(GatewayError::CameraOpenFailed { index: device_index })
        }
    }

    fn close_camera(&self) {
        unsafe { native_stop_live_view() }
    }

    fn is_plc_connected(&self) -> Result<bool, GatewayError> {
        Ok(unsafe { native_is_plc_connected() })
    }

    fn is_camera_connected(&self) -> Result<bool, GatewayError> {
        Ok(unsafe { native_is_camera_connected() })
    }

    fn read_machine_code(&self) -> Result<i32, GatewayError> {
        if !unsafe { native_is_plc_connected() } {
            return Err(GatewayError::PlcNotConnected);
        }
        Ok(unsafe { native_last_plc_value() })
    }

    fn set_light_output(&self, light: Light, on: bool) -> Result<(), GatewayError> {
        // SetPlcBit drops writes silently while disconnected, so check first.
        if !unsafe { native_is_plc_connected() } {
            return Err(GatewayError::PlcNotConnected);
        }
        let device = c_string(self.wiring.device_for(light))?;
        unsafe { native_set_plc_bit(device.as_ptr(), c_int::from(on)) };
        Ok(())
    }

    fn capture_image(&self, filename: &str) -> Result<bool, GatewayError> {
        if !unsafe { native_is_camera_connected() } {
            return Err(GatewayError::CameraNotConnected);
        }
        let c_filename = c_string(filename)?;
        Ok(unsafe { native_capture_image(c_filename.as_ptr()) })
    }
}
