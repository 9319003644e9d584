use anyhow::Result;
use chrono::SecondsFormat;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_result_code, parse_scan_status, to_i64},
    models::{NewScanRecord, ScanRecord},
};

fn row_to_scan_record(row: &Row) -> Result<ScanRecord> {
    let timestamp: String = row.get("timestamp")?;
    let status: String = row.get("status")?;
    let result_code: String = row.get("result_code")?;

    Ok(ScanRecord {
        id: row.get("id")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        initiated_by: row.get("initiated_by")?,
        status: parse_scan_status(&status)?,
        result_code: parse_result_code(&result_code)?,
    })
}

impl Database {
    /// Appends a record and returns its row id. Records are never updated.
    pub async fn insert_scan_record(&self, record: &NewScanRecord) -> Result<i64> {
        let record = record.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO scan_records (timestamp, initiated_by, status, result_code)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    // Fixed-width UTC text so ORDER BY timestamp sorts chronologically.
                    record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                    record.initiated_by,
                    record.status.as_str(),
                    record.result_code.as_str(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Most recent records first.
    pub async fn list_scan_records(&self, limit: usize) -> Result<Vec<ScanRecord>> {
        let limit = to_i64(limit)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, initiated_by, status, result_code
                 FROM scan_records
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1",
            )?;

            let mut rows = stmt.query(params![limit])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_scan_record(row)?);
            }

            Ok(records)
        })
        .await
    }

    pub async fn count_scan_records(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM scan_records", [], |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
        .await
    }
}
