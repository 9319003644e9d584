//! Durable outcome of one scan attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScanRecordStatus {
    Initiated,
    Completed,
    Failed,
}

impl ScanRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanRecordStatus::Initiated => "Initiated",
            ScanRecordStatus::Completed => "Completed",
            ScanRecordStatus::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Pending,
    Success,
    Error,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::Pending => "PENDING",
            ResultCode::Success => "SUCCESS",
            ResultCode::Error => "ERROR",
        }
    }
}

/// Row as handed to the recorder; `id` is assigned on insert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewScanRecord {
    pub timestamp: DateTime<Utc>,
    pub initiated_by: String,
    pub status: ScanRecordStatus,
    pub result_code: ResultCode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub initiated_by: String,
    pub status: ScanRecordStatus,
    pub result_code: ResultCode,
}
