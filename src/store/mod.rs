//! Refresh token bookkeeping for revocation and single-use rotation.
//!
//! Only refresh tokens are tracked. Access tokens are stateless and
//! short-lived. The core depends on [`RefreshTokenStore`] only; the
//! in-memory store is the default and [`SqliteRefreshTokenStore`] keeps
//! records across restarts.

mod memory;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::MemoryRefreshTokenStore;
pub use sqlite::SqliteRefreshTokenStore;

/// A tracked refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenData {
    /// JWT ID of the refresh token
    pub token_id: String,
    /// Identity the token was issued to
    pub identity: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenData {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("refresh token not found")]
    NotFound,
    #[error("refresh token has expired")]
    Expired,
    #[error("refresh token has been revoked")]
    Revoked,
    #[error("storage backend error: {0}")]
    Backend(#[from] sqlx::Error),
    #[error("store lock poisoned")]
    Poisoned,
}

/// Storage for issued refresh tokens.
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Record a newly issued refresh token.
    async fn save(&self, data: RefreshTokenData) -> Result<(), StoreError>;

    /// Look up a live record.
    ///
    /// Fails with [`StoreError::NotFound`] for unknown ids,
    /// [`StoreError::Revoked`] for invalidated ones and
    /// [`StoreError::Expired`] once `expires_at` has passed.
    async fn get(&self, token_id: &str) -> Result<RefreshTokenData, StoreError>;

    /// Mark a record as revoked.
    ///
    /// Fails with [`StoreError::Revoked`] if it already was, so at most one
    /// caller wins a race to invalidate the same token.
    async fn invalidate(&self, token_id: &str) -> Result<(), StoreError>;

    /// Revoke all live records of `identity`. Returns how many were revoked.
    async fn invalidate_all(&self, identity: &str) -> Result<u64, StoreError>;

    /// Remove expired records. Returns how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}
