use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
};

use crate::{
    gateway::{call_blocking, DeviceGateway, Light},
    notify::Notifier,
    operator::OperatorContext,
    recorder::OutcomeRecorder,
    status::DeviceStatus,
};

use super::{
    capture_filename, check_admission,
    state::{ScanPhase, ScanSession, ScanStatus, ScanSummary, SequencerState, StepOutcome},
    AdmissionRejected, LightPattern, SequencerConfig,
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencerSnapshot {
    pub running: bool,
    pub state: SequencerState,
}

/// Held for the whole time a sequence (or a calibration write) owns the
/// light outputs and the camera. Released on drop, including on unwind.
struct RunningGuard {
    flag: Arc<AtomicBool>,
}

impl RunningGuard {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct ScanSequencer {
    gateway: Arc<dyn DeviceGateway>,
    recorder: Arc<dyn OutcomeRecorder>,
    notifier: Arc<dyn Notifier>,
    status_rx: watch::Receiver<DeviceStatus>,
    config: Arc<SequencerConfig>,
    running: Arc<AtomicBool>,
    state: Arc<Mutex<SequencerState>>,
}

impl ScanSequencer {
    pub fn new(
        gateway: Arc<dyn DeviceGateway>,
        recorder: Arc<dyn OutcomeRecorder>,
        notifier: Arc<dyn Notifier>,
        status_rx: watch::Receiver<DeviceStatus>,
        config: SequencerConfig,
    ) -> Self {
        Self {
            gateway,
            recorder,
            notifier,
            status_rx,
            config: Arc::new(config),
            running: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(SequencerState::default())),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn snapshot(&self) -> SequencerSnapshot {
        SequencerSnapshot {
            running: self.is_running(),
            state: self.state.lock().await.clone(),
        }
    }

    /// Admits and launches one sequence in the background.
    ///
    /// A rejection leaves everything untouched apart from one warning event.
    /// The returned handle resolves once the sequence is back in Idle and its
    /// outcome has been handed to the recorder.
    pub async fn start_scan(
        &self,
        operator: &OperatorContext,
    ) -> Result<JoinHandle<ScanSummary>, AdmissionRejected> {
        let guard = self.admit(operator)?;

        let session = ScanSession::begin(&operator.identity);
        log_info!(
            "Scan {} started by {} ({} steps)",
            session.id,
            session.started_by,
            self.config.steps.len()
        );
        self.state.lock().await.begin(session.clone());
        self.notifier
            .info(&format!("Scan started by {}", operator.identity));

        let sequencer = self.clone();
        Ok(tokio::spawn(async move { sequencer.run(guard, session).await }))
    }

    /// Switches every light on or off at once, outside of a sequence.
    pub async fn set_calibration_lights(&self, operator: &OperatorContext, on: bool) -> Result<()> {
        let _guard = self.admit_calibration(operator)?;

        let pattern = if on {
            LightPattern::ALL
        } else {
            LightPattern::NONE
        };

        match self.apply_pattern(pattern).await {
            Ok(()) => {
                log_info!(
                    "Calibration lights {} by {}",
                    if on { "on" } else { "off" },
                    operator.identity
                );
                Ok(())
            }
            Err(err) => {
                log_error!("Calibration lighting failed: {err:?}");
                self.notifier.error("Failed to switch calibration lights");
                Err(err)
            }
        }
    }

    fn admit(&self, operator: &OperatorContext) -> Result<RunningGuard, AdmissionRejected> {
        let status = self.status_rx.borrow().clone();
        let admitted = check_admission(&status, operator, self.is_running()).and_then(|_| {
            RunningGuard::claim(&self.running).ok_or(AdmissionRejected::AlreadyRunning)
        });

        admitted.map_err(|rejection| self.reject(rejection))
    }

    fn admit_calibration(
        &self,
        operator: &OperatorContext,
    ) -> Result<RunningGuard, AdmissionRejected> {
        let status = self.status_rx.borrow().clone();
        let admitted = if self.is_running() {
            Err(AdmissionRejected::AlreadyRunning)
        } else if !operator.can_operate() {
            Err(AdmissionRejected::NotPermitted {
                identity: operator.identity.clone(),
            })
        } else if !status.plc_connected {
            Err(AdmissionRejected::PlcNotConnected)
        } else {
            RunningGuard::claim(&self.running).ok_or(AdmissionRejected::AlreadyRunning)
        };

        admitted.map_err(|rejection| self.reject(rejection))
    }

    fn reject(&self, rejection: AdmissionRejected) -> AdmissionRejected {
        log_warn!("Request rejected: {rejection}");
        self.notifier.warning(&rejection.to_string());
        rejection
    }

    async fn run(self, guard: RunningGuard, session: ScanSession) -> ScanSummary {
        let mut steps = Vec::with_capacity(self.config.steps.len());

        let outcome = match self.drive(&mut steps).await {
            Ok(()) => self.finalize().await,
            Err(err) => Err(err),
        };

        let (status, fault) = match outcome {
            Ok(()) => (ScanStatus::Completed, None),
            Err(err) => {
                log_error!("Scan {} faulted: {err:?}", session.id);
                self.state.lock().await.phase = ScanPhase::Cleanup;
                self.lights_off_best_effort().await;
                (ScanStatus::Failed, Some(format!("{err:#}")))
            }
        };

        let summary = ScanSummary {
            session_id: session.id,
            started_by: session.started_by,
            status,
            steps,
            finished_at: Utc::now(),
            fault,
        };

        self.state.lock().await.finish(summary.clone());
        drop(guard);

        self.recorder.record(summary.to_record());

        match summary.status {
            ScanStatus::Completed => {
                let message = format!(
                    "Scan completed: {}/{} images captured",
                    summary.captured_count(),
                    summary.steps.len()
                );
                log_info!("{message}");
                self.notifier.success(&message);
            }
            _ => {
                let reason = summary.fault.as_deref().unwrap_or("unknown fault");
                self.notifier.error(&format!("Scan failed: {reason}"));
            }
        }

        summary
    }

    async fn drive(&self, steps: &mut Vec<StepOutcome>) -> Result<()> {
        for (index, step) in self.config.steps.iter().enumerate() {
            self.state.lock().await.enter_step(index);

            self.apply_pattern(step.pattern).await?;
            tokio::time::sleep(step.settle_delay).await;

            let filename = capture_filename(
                &step.pattern.file_tag(),
                Local::now(),
                &self.config.image_extension,
            );
            let captured = self.capture(&filename).await?;

            let outcome = StepOutcome {
                pattern: step.pattern,
                filename,
                captured,
            };
            self.state.lock().await.push_outcome(outcome.clone());
            steps.push(outcome);
        }

        Ok(())
    }

    async fn finalize(&self) -> Result<()> {
        self.state.lock().await.phase = ScanPhase::Finalizing;
        self.apply_pattern(LightPattern::NONE)
            .await
            .context("failed to switch lights off after the last step")
    }

    /// Writes all four outputs so lights outside `pattern` are explicitly off.
    async fn apply_pattern(&self, pattern: LightPattern) -> Result<()> {
        call_blocking(&self.gateway, move |gateway| {
            for light in Light::ALL {
                gateway.set_light_output(light, pattern.contains(light))?;
            }
            Ok(())
        })
        .await?
        .with_context(|| format!("failed to apply light pattern {pattern}"))
    }

    /// A failed or empty capture only marks the step; a crashed capture call
    /// faults the sequence.
    async fn capture(&self, filename: &str) -> Result<bool> {
        let name = filename.to_string();
        let result = call_blocking(&self.gateway, move |gateway| gateway.capture_image(&name))
            .await
            .with_context(|| format!("capture of {filename} crashed"))?;

        match result {
            Ok(true) => Ok(true),
            Ok(false) => {
                log_warn!("Camera delivered no frame for {filename}");
                Ok(false)
            }
            Err(err) => {
                log_warn!("Capture of {filename} failed: {err}");
                Ok(false)
            }
        }
    }

    async fn lights_off_best_effort(&self) {
        let result = call_blocking(&self.gateway, |gateway| {
            for light in Light::ALL {
                if let Err(err) = gateway.set_light_output(light, false) {
                    log_warn!("Cleanup could not switch {light:?} off: {err}");
                }
            }
            Ok(())
        })
        .await;

        if let Err(err) = result {
            log_warn!("Cleanup lights-off crashed: {err:?}");
        }
    }
}
