pub mod controller;
pub mod sequence;
pub mod state;

use thiserror::Error;

use crate::{operator::OperatorContext, status::DeviceStatus};

pub use controller::{ScanSequencer, SequencerSnapshot};
pub use sequence::{capture_filename, LightPattern, LightingStep, SequencerConfig};
pub use state::{ScanPhase, ScanSession, ScanStatus, ScanSummary, StepOutcome};

/// Why a start request never reached the hardware.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionRejected {
    #[error("Scan already running")]
    AlreadyRunning,
    #[error("Operator {identity} is not permitted to drive the station")]
    NotPermitted { identity: String },
    #[error("PLC not connected")]
    PlcNotConnected,
    #[error("Camera not connected")]
    CameraNotConnected,
}

/// Checked in a fixed order so the operator always sees the most basic
/// obstacle first.
pub fn check_admission(
    status: &DeviceStatus,
    operator: &OperatorContext,
    running: bool,
) -> Result<(), AdmissionRejected> {
    if running {
        return Err(AdmissionRejected::AlreadyRunning);
    }
    if !operator.can_operate() {
        return Err(AdmissionRejected::NotPermitted {
            identity: operator.identity.clone(),
        });
    }
    if !status.plc_connected {
        return Err(AdmissionRejected::PlcNotConnected);
    }
    if !status.camera_connected {
        return Err(AdmissionRejected::CameraNotConnected);
    }
    Ok(())
}
