use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{NewScanRecord, ResultCode, ScanRecordStatus};

use super::LightPattern;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ScanStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Where the sequencer is right now. `Cleanup` only follows a fault.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum ScanPhase {
    #[default]
    Idle,
    Running {
        step: usize,
    },
    Finalizing,
    Cleanup,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub pattern: LightPattern,
    pub filename: String,
    pub captured: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    pub id: String,
    pub started_by: String,
    pub started_at: DateTime<Utc>,
    pub status: ScanStatus,
    pub steps: Vec<StepOutcome>,
}

impl ScanSession {
    pub fn begin(started_by: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_by: started_by.to_string(),
            started_at: Utc::now(),
            status: ScanStatus::Running,
            steps: Vec::new(),
        }
    }
}

/// What a finished run collapses into.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub session_id: String,
    pub started_by: String,
    pub status: ScanStatus,
    pub steps: Vec<StepOutcome>,
    pub finished_at: DateTime<Utc>,
    /// Set when the run ended in cleanup.
    pub fault: Option<String>,
}

impl ScanSummary {
    pub fn captured_count(&self) -> usize {
        self.steps.iter().filter(|step| step.captured).count()
    }

    pub fn to_record(&self) -> NewScanRecord {
        let (status, result_code) = match self.status {
            ScanStatus::Completed => (ScanRecordStatus::Completed, ResultCode::Success),
            ScanStatus::Failed => (ScanRecordStatus::Failed, ResultCode::Error),
            ScanStatus::Idle | ScanStatus::Running => {
                (ScanRecordStatus::Initiated, ResultCode::Pending)
            }
        };

        NewScanRecord {
            timestamp: self.finished_at,
            initiated_by: self.started_by.clone(),
            status,
            result_code,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencerState {
    pub phase: ScanPhase,
    pub session: Option<ScanSession>,
    pub last_summary: Option<ScanSummary>,
}

impl SequencerState {
    pub fn begin(&mut self, session: ScanSession) {
        self.phase = ScanPhase::Running { step: 0 };
        self.session = Some(session);
    }

    pub fn enter_step(&mut self, step: usize) {
        self.phase = ScanPhase::Running { step };
    }

    pub fn push_outcome(&mut self, outcome: StepOutcome) {
        if let Some(session) = self.session.as_mut() {
            session.steps.push(outcome);
        }
    }

    /// Drops the session and returns to Idle, keeping the summary around for
    /// snapshots.
    pub fn finish(&mut self, summary: ScanSummary) {
        self.phase = ScanPhase::Idle;
        self.session = None;
        self.last_summary = Some(summary);
    }
}
