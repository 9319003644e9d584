pub mod scan_record;

pub use scan_record::{NewScanRecord, ResultCode, ScanRecord, ScanRecordStatus};
