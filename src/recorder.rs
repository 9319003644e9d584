use log::{debug, error};
use tokio::runtime::Handle;

use crate::db::{Database, NewScanRecord};

/// Append-only sink for scan outcomes.
///
/// `record` must return immediately and must never fail back into the caller;
/// implementations log their own persistence errors.
pub trait OutcomeRecorder: Send + Sync {
    fn record(&self, record: NewScanRecord);
}

pub struct SqliteOutcomeRecorder {
    db: Database,
}

impl SqliteOutcomeRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl OutcomeRecorder for SqliteOutcomeRecorder {
    fn record(&self, record: NewScanRecord) {
        let Ok(runtime) = Handle::try_current() else {
            error!(
                "No async runtime available; dropping {} scan record for {}",
                record.status.as_str(),
                record.initiated_by
            );
            return;
        };

        let db = self.db.clone();
        runtime.spawn(async move {
            match db.insert_scan_record(&record).await {
                Ok(id) => debug!(
                    "Recorded scan {} ({}/{}) for {}",
                    id,
                    record.status.as_str(),
                    record.result_code.as_str(),
                    record.initiated_by
                ),
                Err(err) => error!(
                    "Failed to persist {} scan record for {}: {err:?}",
                    record.status.as_str(),
                    record.initiated_by
                ),
            }
        });
    }
}
