//! SQLite-backed refresh token store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::{RefreshTokenData, RefreshTokenStore, StoreError};
use crate::jwt::timestamp_to_datetime;

/// Durable [`RefreshTokenStore`]. Timestamps are stored as Unix seconds.
#[derive(Clone)]
pub struct SqliteRefreshTokenStore {
    pool: SqlitePool,
}

impl SqliteRefreshTokenStore {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!(path = %path, "Refresh token store opened");
        Ok(store)
    }

    /// Wrap an existing pool. Call [`SqliteRefreshTokenStore::migrate`]
    /// before use if the table may not exist yet.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS refresh_tokens (
                token_id TEXT PRIMARY KEY NOT NULL,
                identity TEXT NOT NULL,
                issued_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                revoked INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_identity ON refresh_tokens(identity)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List live refresh tokens of `identity`, newest first.
    pub async fn list_by_identity(
        &self,
        identity: &str,
    ) -> Result<Vec<RefreshTokenData>, StoreError> {
        let rows: Vec<(String, String, i64, i64)> = sqlx::query_as(
            "SELECT token_id, identity, issued_at, expires_at FROM refresh_tokens WHERE identity = ? AND revoked = 0 AND expires_at > ? ORDER BY issued_at DESC",
        )
        .bind(identity)
        .bind(Utc::now().timestamp())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(token_id, identity, issued_at, expires_at)| RefreshTokenData {
                token_id,
                identity,
                issued_at: timestamp_to_datetime(issued_at),
                expires_at: timestamp_to_datetime(expires_at),
            })
            .collect())
    }
}

#[async_trait]
impl RefreshTokenStore for SqliteRefreshTokenStore {
    async fn save(&self, data: RefreshTokenData) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO refresh_tokens (token_id, identity, issued_at, expires_at, revoked) VALUES (?, ?, ?, ?, 0)",
        )
        .bind(&data.token_id)
        .bind(&data.identity)
        .bind(data.issued_at.timestamp())
        .bind(data.expires_at.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<RefreshTokenData, StoreError> {
        let row: Option<(String, i64, i64, bool)> = sqlx::query_as(
            "SELECT identity, issued_at, expires_at, revoked FROM refresh_tokens WHERE token_id = ?",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;

        let (identity, issued_at, expires_at, revoked) = row.ok_or(StoreError::NotFound)?;

        if revoked {
            return Err(StoreError::Revoked);
        }

        let data = RefreshTokenData {
            token_id: token_id.to_string(),
            identity,
            issued_at: timestamp_to_datetime(issued_at),
            expires_at: timestamp_to_datetime(expires_at),
        };
        if data.is_expired_at(Utc::now()) {
            return Err(StoreError::Expired);
        }

        Ok(data)
    }

    async fn invalidate(&self, token_id: &str) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE token_id = ? AND revoked = 0")
                .bind(token_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing updated: either unknown or already revoked.
        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM refresh_tokens WHERE token_id = ?")
                .bind(token_id)
                .fetch_optional(&self.pool)
                .await?;

        match exists {
            Some(_) => Err(StoreError::Revoked),
            None => Err(StoreError::NotFound),
        }
    }

    async fn invalidate_all(&self, identity: &str) -> Result<u64, StoreError> {
        let result =
            sqlx::query("UPDATE refresh_tokens SET revoked = 1 WHERE identity = ? AND revoked = 0")
                .bind(identity)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
