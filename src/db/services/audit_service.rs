use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::db::StoreError;
use crate::db::models::AuditEntry;

/// Append-only storage for the audit trail. There is deliberately no update
/// or delete operation.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(
        &self,
        user_id: i64,
        action: &str,
        container_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<AuditEntry, StoreError>;

    /// Most recent entries first.
    async fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>, StoreError>;
}

#[derive(Clone)]
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn append(
        &self,
        user_id: i64,
        action: &str,
        container_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<AuditEntry, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO audit_log (user_id, action, container_id, timestamp)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(action)
        .bind(container_id)
        .bind(timestamp)
        .fetch_one(&self.pool)
        .await?;

        Ok(AuditEntry {
            id: row.get::<i64, _>("id"),
            user_id,
            action: action.to_string(),
            container_id: container_id.to_string(),
            timestamp,
        })
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AuditEntry>, StoreError> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r#"
            SELECT id, user_id, action, container_id, timestamp
            FROM audit_log
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
