//! Stateless bearer-token authentication core.
//!
//! Issues HS256 access/refresh token pairs, verifies them, and extracts the
//! caller's identity from HTTP headers or gRPC metadata. Configuration is a
//! process-wide snapshot ([`config::init`]) or an explicit [`config::Config`]
//! value passed around by the caller.

pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod jwt;
pub mod pair;
pub mod path;
pub mod store;

pub use auth::{AuthError, HeaderSource, parse_request, parse_request_ignore_skip};
pub use config::{Config, ConfigError, ConfigOption};
pub use jwt::{Claims, SignedToken, TokenError};
pub use pair::{TokenPair, TokenRotator, TokenType};
pub use store::{
    MemoryRefreshTokenStore, RefreshTokenData, RefreshTokenStore, SqliteRefreshTokenStore,
    StoreError,
};
