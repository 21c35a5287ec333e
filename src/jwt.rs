//! JWT signing and verification.
//!
//! Tokens are HS256-signed claim maps. Every issued token carries the
//! registered time claims `nbf`, `iat` and `exp` in Unix seconds; when the
//! configuration requires an identity, the identity claim is added as well.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{self, Config};
use crate::pair::TokenType;
use crate::store::StoreError;

/// Claim map carried in a token payload.
pub type Claims = Map<String, Value>;

/// Not before (Unix seconds)
pub const CLAIM_NOT_BEFORE: &str = "nbf";
/// Issued at (Unix seconds)
pub const CLAIM_ISSUED_AT: &str = "iat";
/// Expiration time (Unix seconds)
pub const CLAIM_EXPIRATION: &str = "exp";

/// A freshly signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedToken {
    /// The compact JWT string
    pub token: String,
    /// Value of the `exp` claim
    pub expires_at: DateTime<Utc>,
}

/// Errors raised while signing, verifying or rotating tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token is empty")]
    EmptyToken,
    #[error("token is malformed: {0}")]
    Malformed(String),
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is not valid yet")]
    NotYetValid,
    #[error("token does not carry the `{0}` identity claim")]
    MissingIdentity(String),
    #[error("expected {expected} token, got `{found}`")]
    WrongTokenType { expected: TokenType, found: String },
    #[error("invalid refresh token: {0}")]
    InvalidRefreshToken(#[source] Box<TokenError>),
    #[error("refresh token store failure: {0}")]
    Store(#[from] StoreError),
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl TokenError {
    /// True for failures caused by the `exp`/`nbf` window rather than the
    /// token's structure or signature.
    pub fn is_expiry(&self) -> bool {
        matches!(self, TokenError::Expired | TokenError::NotYetValid)
    }
}

impl Config {
    /// Sign a token for `identity` with the access token lifetime.
    /// The identity claim is only added when the configuration requires one.
    pub fn sign(&self, identity: &str) -> Result<SignedToken, TokenError> {
        let mut claims = Claims::new();
        if self.is_identity_required() {
            claims.insert(self.identity_key().to_string(), Value::from(identity));
        }
        self.issue(claims, self.expiration())
    }

    /// Sign caller-supplied claims with the access token lifetime.
    /// `nbf`, `iat` and `exp` are always set by the signer and replace any
    /// values the caller put there.
    pub fn sign_with_claims(&self, claims: Claims) -> Result<SignedToken, TokenError> {
        self.issue(claims, self.expiration())
    }

    /// Stamp the time claims onto `claims` and sign them.
    pub(crate) fn issue(
        &self,
        mut claims: Claims,
        lifetime: Duration,
    ) -> Result<SignedToken, TokenError> {
        let now = Utc::now().timestamp();
        let exp = now.saturating_add(i64::try_from(lifetime.as_secs()).unwrap_or(i64::MAX));

        claims.insert(CLAIM_NOT_BEFORE.to_string(), Value::from(now));
        claims.insert(CLAIM_ISSUED_AT.to_string(), Value::from(now));
        claims.insert(CLAIM_EXPIRATION.to_string(), Value::from(exp));

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.key().as_bytes()),
        )
        .map_err(TokenError::Signing)?;

        Ok(SignedToken {
            token,
            expires_at: timestamp_to_datetime(exp),
        })
    }

    /// Verify `token` against this configuration's key.
    pub fn get_claims(&self, token: &str) -> Result<Claims, TokenError> {
        parse_with_key(token, self.key())
    }

    /// Verify `token` against `key` and return the identity it carries.
    /// Returns an empty identity when no identity claim is configured.
    pub fn parse_identity(&self, token: &str, key: &str) -> Result<String, TokenError> {
        let claims = parse_with_key(token, key)?;
        self.identity_from_claims(&claims)
    }

    pub(crate) fn identity_from_claims(&self, claims: &Claims) -> Result<String, TokenError> {
        if !self.is_identity_required() {
            return Ok(String::new());
        }

        claims
            .get(self.identity_key())
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TokenError::MissingIdentity(self.identity_key().to_string()))
    }
}

/// Verify the signature and time claims of `token` against `key` and return
/// its full claim set.
pub fn parse_with_key(token: &str, key: &str) -> Result<Claims, TokenError> {
    if token.is_empty() {
        return Err(TokenError::EmptyToken);
    }

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_nbf = true;
    validation.validate_aud = false;

    let token_data =
        jsonwebtoken::decode::<Claims>(token, &DecodingKey::from_secret(key.as_bytes()), &validation)
            .map_err(decode_error)?;

    Ok(token_data.claims)
}

fn decode_error(e: jsonwebtoken::errors::Error) -> TokenError {
    match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::ImmatureSignature => TokenError::NotYetValid,
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        _ => TokenError::Malformed(e.to_string()),
    }
}

/// Sign a token for `identity` with the process-wide configuration.
pub fn sign(identity: &str) -> Result<SignedToken, TokenError> {
    config::current().sign(identity)
}

/// Sign custom claims with the process-wide configuration.
pub fn sign_with_claims(claims: Claims) -> Result<SignedToken, TokenError> {
    config::current().sign_with_claims(claims)
}

/// Verify `token` against the process-wide key.
pub fn get_claims(token: &str) -> Result<Claims, TokenError> {
    config::current().get_claims(token)
}

/// Verify `token` against `key` and extract the configured identity claim.
pub fn parse_identity(token: &str, key: &str) -> Result<String, TokenError> {
    config::current().parse_identity(token, key)
}

/// Convert Unix seconds to a UTC datetime, saturating on overflow.
pub(crate) fn timestamp_to_datetime(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
