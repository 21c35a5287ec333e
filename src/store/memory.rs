//! In-memory refresh token store. Records do not survive a restart.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::{RefreshTokenData, RefreshTokenStore, StoreError};

struct Entry {
    data: RefreshTokenData,
    revoked: bool,
}

/// Default [`RefreshTokenStore`] backed by a `HashMap`.
pub struct MemoryRefreshTokenStore {
    tokens: RwLock<HashMap<String, Entry>>,
}

impl MemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records held, expired and revoked ones included.
    pub fn len(&self) -> usize {
        self.tokens.read().map(|tokens| tokens.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryRefreshTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn save(&self, data: RefreshTokenData) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().map_err(|_| StoreError::Poisoned)?;
        tokens.insert(
            data.token_id.clone(),
            Entry {
                data,
                revoked: false,
            },
        );
        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<RefreshTokenData, StoreError> {
        let tokens = self.tokens.read().map_err(|_| StoreError::Poisoned)?;
        let entry = tokens.get(token_id).ok_or(StoreError::NotFound)?;

        if entry.revoked {
            return Err(StoreError::Revoked);
        }
        if entry.data.is_expired_at(Utc::now()) {
            return Err(StoreError::Expired);
        }

        Ok(entry.data.clone())
    }

    async fn invalidate(&self, token_id: &str) -> Result<(), StoreError> {
        let mut tokens = self.tokens.write().map_err(|_| StoreError::Poisoned)?;
        let entry = tokens.get_mut(token_id).ok_or(StoreError::NotFound)?;

        if entry.revoked {
            return Err(StoreError::Revoked);
        }
        entry.revoked = true;
        Ok(())
    }

    async fn invalidate_all(&self, identity: &str) -> Result<u64, StoreError> {
        let mut tokens = self.tokens.write().map_err(|_| StoreError::Poisoned)?;

        let mut count = 0;
        for entry in tokens.values_mut() {
            if entry.data.identity == identity && !entry.revoked {
                entry.revoked = true;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let mut tokens = self.tokens.write().map_err(|_| StoreError::Poisoned)?;
        let now = Utc::now();

        let before = tokens.len();
        tokens.retain(|_, entry| !entry.data.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}
