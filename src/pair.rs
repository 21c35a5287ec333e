//! Access/refresh token pairs and rotation.
//!
//! Dual-token system:
//! - Access tokens: short-lived, `type = "access"`
//! - Refresh tokens: long-lived, `type = "refresh"`, carry a `jti`
//!
//! Rotation is stateless by default: [`refresh_tokens`] accepts any valid
//! refresh token until it expires. [`TokenRotator`] adds single-use
//! enforcement on top of a [`RefreshTokenStore`].

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{self, Config};
use crate::jwt::{Claims, TokenError, parse_with_key};
use crate::store::{RefreshTokenData, RefreshTokenStore, StoreError};

/// Claim distinguishing access from refresh tokens.
pub const CLAIM_TYPE: &str = "type";

/// JWT ID claim carried by refresh tokens.
pub const CLAIM_TOKEN_ID: &str = "jti";

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An access token and a refresh token issued together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expire_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expire_at: DateTime<Utc>,
}

/// A pair together with the bookkeeping record of its refresh token.
struct IssuedPair {
    pair: TokenPair,
    refresh: RefreshTokenData,
}

/// Verified contents of a refresh token.
struct RefreshClaims {
    identity: String,
    token_id: Option<String>,
}

impl Config {
    /// Issue an access/refresh pair for `identity`.
    pub fn sign_tokens(&self, identity: &str) -> Result<TokenPair, TokenError> {
        self.issue_pair(identity).map(|issued| issued.pair)
    }

    /// Exchange a refresh token for a brand-new pair.
    ///
    /// Every verification failure, including an access token presented in
    /// place of a refresh token, is reported as
    /// [`TokenError::InvalidRefreshToken`]. An empty input is
    /// [`TokenError::EmptyToken`].
    pub fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let claims = self.verify_refresh_token(refresh_token)?;
        self.sign_tokens(&claims.identity)
    }

    fn issue_pair(&self, identity: &str) -> Result<IssuedPair, TokenError> {
        let access = self.issue(self.typed_claims(identity, TokenType::Access), self.expiration())?;

        let token_id = uuid::Uuid::new_v4().to_string();
        let mut refresh_claims = self.typed_claims(identity, TokenType::Refresh);
        refresh_claims.insert(CLAIM_TOKEN_ID.to_string(), Value::from(token_id.clone()));
        let refresh = self.issue(refresh_claims, self.refresh_token_expiration())?;

        let record = RefreshTokenData {
            token_id,
            identity: identity.to_string(),
            issued_at: Utc::now(),
            expires_at: refresh.expires_at,
        };

        Ok(IssuedPair {
            pair: TokenPair {
                access_token: access.token,
                access_expire_at: access.expires_at,
                refresh_token: refresh.token,
                refresh_expire_at: refresh.expires_at,
            },
            refresh: record,
        })
    }

    fn typed_claims(&self, identity: &str, token_type: TokenType) -> Claims {
        let mut claims = Claims::new();
        if self.is_identity_required() {
            claims.insert(self.identity_key().to_string(), Value::from(identity));
        }
        claims.insert(CLAIM_TYPE.to_string(), Value::from(token_type.as_str()));
        claims
    }

    fn verify_refresh_token(&self, refresh_token: &str) -> Result<RefreshClaims, TokenError> {
        if refresh_token.is_empty() {
            return Err(TokenError::EmptyToken);
        }

        let invalid = |e: TokenError| TokenError::InvalidRefreshToken(Box::new(e));

        let claims = parse_with_key(refresh_token, self.key()).map_err(invalid)?;

        let found = claims.get(CLAIM_TYPE).and_then(Value::as_str).unwrap_or("");
        if found != TokenType::Refresh.as_str() {
            return Err(invalid(TokenError::WrongTokenType {
                expected: TokenType::Refresh,
                found: found.to_string(),
            }));
        }

        let identity = self.identity_from_claims(&claims).map_err(invalid)?;
        let token_id = claims
            .get(CLAIM_TOKEN_ID)
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(RefreshClaims { identity, token_id })
    }
}

/// Issue an access/refresh pair with the process-wide configuration.
pub fn sign_tokens(identity: &str) -> Result<TokenPair, TokenError> {
    config::current().sign_tokens(identity)
}

/// Stateless rotation with the process-wide configuration.
pub fn refresh_tokens(refresh_token: &str) -> Result<TokenPair, TokenError> {
    config::current().refresh_tokens(refresh_token)
}

/// Token pair issuance with single-use refresh tokens.
///
/// Every refresh token issued through the rotator is recorded in the store.
/// Presenting it to [`TokenRotator::refresh_tokens`] invalidates the record
/// before the new pair is issued, so a second presentation is rejected.
#[derive(Clone)]
pub struct TokenRotator {
    store: Arc<dyn RefreshTokenStore>,
    config: Option<Arc<Config>>,
}

impl TokenRotator {
    /// Rotator using the process-wide configuration at call time.
    pub fn new(store: Arc<dyn RefreshTokenStore>) -> Self {
        Self {
            store,
            config: None,
        }
    }

    /// Rotator pinned to a specific configuration.
    pub fn with_config(store: Arc<dyn RefreshTokenStore>, config: Arc<Config>) -> Self {
        Self {
            store,
            config: Some(config),
        }
    }

    pub fn store(&self) -> &Arc<dyn RefreshTokenStore> {
        &self.store
    }

    fn config(&self) -> Arc<Config> {
        self.config.clone().unwrap_or_else(config::current)
    }

    /// Issue a pair and record its refresh token.
    pub async fn sign_tokens(&self, identity: &str) -> Result<TokenPair, TokenError> {
        let issued = self.config().issue_pair(identity)?;
        debug!(token_id = %issued.refresh.token_id, "Recording refresh token");
        self.store.save(issued.refresh).await?;
        Ok(issued.pair)
    }

    /// Exchange a recorded refresh token for a new pair, invalidating it.
    ///
    /// The new refresh token is recorded before the old one is invalidated,
    /// so a failing store leaves the presented token usable. If another
    /// caller invalidates the old token first, the new record is revoked
    /// again and the call fails with [`StoreError::Revoked`].
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenPair, TokenError> {
        let config = self.config();
        let claims = config.verify_refresh_token(refresh_token)?;

        let token_id = claims.token_id.ok_or_else(|| {
            TokenError::InvalidRefreshToken(Box::new(TokenError::Malformed(format!(
                "refresh token has no `{CLAIM_TOKEN_ID}` claim"
            ))))
        })?;

        let record = self.store.get(&token_id).await.map_err(rejection)?;
        if config.is_identity_required() && record.identity != claims.identity {
            return Err(TokenError::InvalidRefreshToken(Box::new(
                TokenError::Malformed("refresh token identity does not match its record".into()),
            )));
        }

        let issued = config.issue_pair(&record.identity)?;
        let new_id = issued.refresh.token_id.clone();
        self.store.save(issued.refresh).await?;

        // Check-and-set: only one concurrent presentation gets past this.
        if let Err(e) = self.store.invalidate(&token_id).await {
            if let Err(cleanup) = self.store.invalidate(&new_id).await {
                warn!(
                    token_id = %new_id,
                    error = %cleanup,
                    "Failed to revoke unused refresh token"
                );
            }
            return Err(rejection(e));
        }
        debug!(token_id = %token_id, new_token_id = %new_id, "Refresh token rotated");
        Ok(issued.pair)
    }

    /// Revoke a single refresh token by its `jti`.
    pub async fn revoke(&self, token_id: &str) -> Result<(), StoreError> {
        self.store.invalidate(token_id).await
    }

    /// Revoke every refresh token issued to `identity`.
    pub async fn revoke_all(&self, identity: &str) -> Result<u64, StoreError> {
        self.store.invalidate_all(identity).await
    }
}

/// Map store lookups to refresh rejections; backend failures stay store errors.
fn rejection(e: StoreError) -> TokenError {
    match e {
        StoreError::Backend(_) | StoreError::Poisoned => TokenError::Store(e),
        other => TokenError::InvalidRefreshToken(Box::new(TokenError::Store(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{with_expiration, with_identity_key, with_refresh_token_expiration};
    use crate::store::MemoryRefreshTokenStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Memory store whose `save` can be switched to fail.
    struct FlakyStore {
        inner: MemoryRefreshTokenStore,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl RefreshTokenStore for FlakyStore {
        async fn save(&self, data: RefreshTokenData) -> Result<(), StoreError> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StoreError::Poisoned);
            }
            self.inner.save(data).await
        }

        async fn get(&self, token_id: &str) -> Result<RefreshTokenData, StoreError> {
            self.inner.get(token_id).await
        }

        async fn invalidate(&self, token_id: &str) -> Result<(), StoreError> {
            self.inner.invalidate(token_id).await
        }

        async fn invalidate_all(&self, identity: &str) -> Result<u64, StoreError> {
            self.inner.invalidate_all(identity).await
        }

        async fn purge_expired(&self) -> Result<u64, StoreError> {
            self.inner.purge_expired().await
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config::new("test-secret-key", [with_identity_key("user_id")]).unwrap())
    }

    #[test]
    fn test_sign_tokens_types_and_expiry() {
        let config = test_config();
        let pair = config.sign_tokens("test-user-123").unwrap();

        assert!(pair.refresh_expire_at > pair.access_expire_at);

        let access = config.get_claims(&pair.access_token).unwrap();
        assert_eq!(access[CLAIM_TYPE], "access");
        assert_eq!(access["user_id"], "test-user-123");
        assert!(!access.contains_key(CLAIM_TOKEN_ID));

        let refresh = config.get_claims(&pair.refresh_token).unwrap();
        assert_eq!(refresh[CLAIM_TYPE], "refresh");
        assert!(refresh[CLAIM_TOKEN_ID].as_str().is_some());
        assert_eq!(
            refresh[crate::jwt::CLAIM_EXPIRATION].as_i64(),
            Some(pair.refresh_expire_at.timestamp())
        );
    }

    #[test]
    fn test_refresh_issues_new_pair_for_same_identity() {
        let config = test_config();
        let pair = config.sign_tokens("test-user-123").unwrap();

        let rotated = config.refresh_tokens(&pair.refresh_token).unwrap();
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        let identity = config
            .parse_identity(&rotated.access_token, "test-secret-key")
            .unwrap();
        assert_eq!(identity, "test-user-123");
    }

    #[test]
    fn test_stateless_refresh_allows_reuse() {
        let config = test_config();
        let pair = config.sign_tokens("alice").unwrap();

        assert!(config.refresh_tokens(&pair.refresh_token).is_ok());
        assert!(config.refresh_tokens(&pair.refresh_token).is_ok());
    }

    #[test]
    fn test_refresh_rejects_access_token() {
        let config = test_config();
        let pair = config.sign_tokens("alice").unwrap();

        let err = config.refresh_tokens(&pair.access_token).unwrap_err();
        match err {
            TokenError::InvalidRefreshToken(cause) => assert!(matches!(
                *cause,
                TokenError::WrongTokenType {
                    expected: TokenType::Refresh,
                    ..
                }
            )),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_refresh_rejects_untyped_token() {
        let config = test_config();
        let signed = config.sign("alice").unwrap();

        let err = config.refresh_tokens(&signed.token).unwrap_err();
        assert!(matches!(err, TokenError::InvalidRefreshToken(_)));
    }

    #[test]
    fn test_refresh_empty_token() {
        let config = test_config();
        let err = config.refresh_tokens("").unwrap_err();
        assert!(matches!(err, TokenError::EmptyToken));
        assert_eq!(err.to_string(), "token is empty");
    }

    #[test]
    fn test_refresh_rejects_foreign_key() {
        let config = test_config();
        let other = Config::new("wrong-key", [with_identity_key("user_id")]).unwrap();
        let pair = other.sign_tokens("alice").unwrap();

        let err = config.refresh_tokens(&pair.refresh_token).unwrap_err();
        match err {
            TokenError::InvalidRefreshToken(cause) => {
                assert!(matches!(*cause, TokenError::InvalidSignature))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_custom_lifetimes() {
        let config = Config::new(
            "k",
            [
                with_expiration(Duration::from_secs(60)),
                with_refresh_token_expiration(Duration::from_secs(120)),
            ],
        )
        .unwrap();
        let pair = config.sign_tokens("alice").unwrap();

        // The two tokens are stamped separately and may straddle a second.
        let delta = (pair.refresh_expire_at - pair.access_expire_at).num_seconds();
        assert!((60..=61).contains(&delta));
    }

    #[tokio::test]
    async fn test_rotator_enforces_single_use() {
        let store = Arc::new(MemoryRefreshTokenStore::new());
        let rotator = TokenRotator::with_config(store.clone(), test_config());

        let pair = rotator.sign_tokens("alice").await.unwrap();
        let rotated = rotator.refresh_tokens(&pair.refresh_token).await.unwrap();

        let err = rotator.refresh_tokens(&pair.refresh_token).await.unwrap_err();
        match err {
            TokenError::InvalidRefreshToken(cause) => assert!(matches!(
                *cause,
                TokenError::Store(StoreError::Revoked)
            )),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(rotator.refresh_tokens(&rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_save_keeps_old_token_usable() {
        let store = Arc::new(FlakyStore {
            inner: MemoryRefreshTokenStore::new(),
            fail_saves: AtomicBool::new(false),
        });
        let rotator = TokenRotator::with_config(store.clone(), test_config());
        let pair = rotator.sign_tokens("alice").await.unwrap();

        store.fail_saves.store(true, Ordering::SeqCst);
        let err = rotator.refresh_tokens(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, TokenError::Store(StoreError::Poisoned)));

        store.fail_saves.store(false, Ordering::SeqCst);
        assert!(rotator.refresh_tokens(&pair.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_rotator_rejects_unrecorded_token() {
        let config = test_config();
        let rotator =
            TokenRotator::with_config(Arc::new(MemoryRefreshTokenStore::new()), config.clone());

        let pair = config.sign_tokens("alice").unwrap();
        let err = rotator.refresh_tokens(&pair.refresh_token).await.unwrap_err();
        match err {
            TokenError::InvalidRefreshToken(cause) => assert!(matches!(
                *cause,
                TokenError::Store(StoreError::NotFound)
            )),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rotator_revoke_all() {
        let rotator =
            TokenRotator::with_config(Arc::new(MemoryRefreshTokenStore::new()), test_config());

        let first = rotator.sign_tokens("alice").await.unwrap();
        let second = rotator.sign_tokens("alice").await.unwrap();
        let other = rotator.sign_tokens("bob").await.unwrap();

        assert_eq!(rotator.revoke_all("alice").await.unwrap(), 2);

        assert!(rotator.refresh_tokens(&first.refresh_token).await.is_err());
        assert!(rotator.refresh_tokens(&second.refresh_token).await.is_err());
        assert!(rotator.refresh_tokens(&other.refresh_token).await.is_ok());
    }
}
