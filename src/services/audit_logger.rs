use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::db::StoreError;
use crate::db::models::AuditEntry;
use crate::db::services::AuditStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditWriteFailure {
    #[error("audit store rejected the entry: {0}")]
    Store(String),
    #[error("audit store did not respond within {0:?}")]
    TimedOut(Duration),
}

/// Records mutating actions.
///
/// Writes are serialized so ids and timestamps are assigned in the same
/// order, which keeps the trail sorted by time.
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    write_lock: Mutex<()>,
    timeout: Duration,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>, timeout: Duration) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
            timeout,
        }
    }

    pub async fn record(
        &self,
        user_id: i64,
        action: &str,
        container_id: &str,
    ) -> Result<AuditEntry, AuditWriteFailure> {
        let _guard = self.write_lock.lock().await;
        let timestamp = Utc::now();

        let result = tokio::time::timeout(
            self.timeout,
            self.store.append(user_id, action, container_id, timestamp),
        )
        .await;

        match result {
            Ok(Ok(entry)) => {
                info!(
                    audit_id = entry.id,
                    user_id,
                    action,
                    target = %container_id,
                    "Audit entry recorded."
                );
                Ok(entry)
            }
            Ok(Err(e)) => {
                error!(user_id, action, target = %container_id, error = %e, "Failed to write audit entry.");
                Err(AuditWriteFailure::Store(e.to_string()))
            }
            Err(_) => {
                error!(user_id, action, target = %container_id, timeout = ?self.timeout, "Audit write timed out.");
                Err(AuditWriteFailure::TimedOut(self.timeout))
            }
        }
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>, StoreError> {
        self.store.recent(limit).await
    }
}
