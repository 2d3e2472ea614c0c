use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::db::StoreError;
use crate::db::enums::Role;
use crate::db::models::{User, UserRow};

/// Keyed access to console accounts.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a new account. Fails with `DuplicateUsername` if the name is taken.
    async fn insert(&self, username: &str, password_hash: &str, role: Role) -> Result<User, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}

#[derive(Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn insert(&self, username: &str, password_hash: &str, role: Role) -> Result<User, StoreError> {
        if username.trim().is_empty() {
            return Err(StoreError::InvalidRecord("username must not be empty".to_string()));
        }

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO users (username, password_hash, role, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        let row = match result {
            Ok(row) => row,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(StoreError::DuplicateUsername(username.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(User {
            id: row.get::<i64, _>("id"),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: now,
        })
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::try_from)
            .transpose()
            .map_err(StoreError::InvalidRecord)
    }
}

/// Creates the account unless one with the same username already exists.
/// Returns `true` when a new account was inserted.
pub async fn ensure_user(
    store: &dyn UserStore,
    username: &str,
    password_hash: &str,
    role: Role,
) -> Result<bool, StoreError> {
    if store.find_by_username(username).await?.is_some() {
        return Ok(false);
    }
    match store.insert(username, password_hash, role).await {
        Ok(_) => Ok(true),
        // Lost a race against another provisioning call; the account exists either way.
        Err(StoreError::DuplicateUsername(_)) => Ok(false),
        Err(e) => Err(e),
    }
}
