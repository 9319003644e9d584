use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::{ResultCode, ScanRecordStatus};

pub fn to_i64(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_scan_status(value: &str) -> Result<ScanRecordStatus> {
    match value {
        "Initiated" => Ok(ScanRecordStatus::Initiated),
        "Completed" => Ok(ScanRecordStatus::Completed),
        "Failed" => Ok(ScanRecordStatus::Failed),
        other => Err(anyhow!("unknown scan status {other}")),
    }
}

pub fn parse_result_code(value: &str) -> Result<ResultCode> {
    match value {
        "PENDING" => Ok(ResultCode::Pending),
        "SUCCESS" => Ok(ResultCode::Success),
        "ERROR" => Ok(ResultCode::Error),
        other => Err(anyhow!("unknown result code {other}")),
    }
}
