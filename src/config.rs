//! Process-wide token configuration.
//!
//! The active configuration is an immutable [`Config`] snapshot behind a
//! `RwLock<Arc<_>>`. [`init`] and [`reset`] build a complete new snapshot
//! and swap it in under the write lock, so readers either see the old
//! configuration or the new one, never a mix. Readers only hold the read
//! lock long enough to clone the `Arc`.

use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::path;

/// Built-in signing key used until [`init`] is called and after [`reset`].
pub const DEFAULT_KEY: &str = "Rtg8BPKNEf2mB4mgvKONGPZZQSaJWNLijxR42qRgq0iBb5";

/// Default name of the claim holding the identity.
pub const DEFAULT_IDENTITY_KEY: &str = "identityKey";

/// Default access token lifetime: 2 hours
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(2 * 60 * 60);

/// Default refresh token lifetime: 7 days
pub const DEFAULT_REFRESH_TOKEN_EXPIRATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Longest accepted token lifetime: 100 years. Keeps `exp` well inside the
/// range of a timestamp so a longer refresh lifetime always yields a later
/// expiry.
pub const MAX_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Health and metrics endpoints added by [`with_common_skip_paths`].
pub const COMMON_SKIP_PATHS: &[&str] = &[
    "/health", "/healthz", "/livez", "/readyz", "/metrics", "/version",
];

static CONFIG: LazyLock<RwLock<Arc<Config>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Config::default())));

/// Token signing and verification settings.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    key: String,
    identity_key: String,
    expiration: Duration,
    refresh_token_expiration: Duration,
    skip_paths: Vec<String>,
}

/// A recognized configuration override, applied in order by [`Config::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOption {
    /// Name of the identity claim. Empty disables the identity requirement.
    IdentityKey(String),
    /// Access token lifetime.
    Expiration(Duration),
    /// Refresh token lifetime.
    RefreshTokenExpiration(Duration),
    /// Replace the skip-path list.
    SkipPaths(Vec<String>),
    /// Append [`COMMON_SKIP_PATHS`] to the skip-path list.
    CommonSkipPaths,
}

/// Invalid configuration, reported by [`init`] and [`Config::new`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("signing key must not be empty")]
    EmptyKey,
    #[error("access token lifetime must be at least one second")]
    ZeroExpiration,
    #[error(
        "refresh token lifetime ({refresh:?}) must be longer than access token lifetime ({access:?})"
    )]
    RefreshNotAfterAccess { access: Duration, refresh: Duration },
    #[error("token lifetime ({lifetime:?}) exceeds the maximum of {max:?}")]
    LifetimeTooLong { lifetime: Duration, max: Duration },
}

pub fn with_identity_key(key: impl Into<String>) -> ConfigOption {
    ConfigOption::IdentityKey(key.into())
}

pub fn with_expiration(expiration: Duration) -> ConfigOption {
    ConfigOption::Expiration(expiration)
}

pub fn with_refresh_token_expiration(expiration: Duration) -> ConfigOption {
    ConfigOption::RefreshTokenExpiration(expiration)
}

pub fn with_skip_paths<I, S>(paths: I) -> ConfigOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ConfigOption::SkipPaths(paths.into_iter().map(Into::into).collect())
}

pub fn with_common_skip_paths() -> ConfigOption {
    ConfigOption::CommonSkipPaths
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.to_string(),
            identity_key: DEFAULT_IDENTITY_KEY.to_string(),
            expiration: DEFAULT_EXPIRATION,
            refresh_token_expiration: DEFAULT_REFRESH_TOKEN_EXPIRATION,
            skip_paths: Vec::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("key", &"[hidden]")
            .field("identity_key", &self.identity_key)
            .field("expiration", &self.expiration)
            .field("refresh_token_expiration", &self.refresh_token_expiration)
            .field("skip_paths", &self.skip_paths)
            .finish()
    }
}

impl Config {
    /// Build a configuration from the built-in defaults, the given key and
    /// the options, in order.
    pub fn new<I>(key: impl Into<String>, options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = ConfigOption>,
    {
        let mut config = Self {
            key: key.into(),
            ..Self::default()
        };

        for option in options {
            config.apply(option);
        }

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, option: ConfigOption) {
        match option {
            ConfigOption::IdentityKey(key) => self.identity_key = key,
            ConfigOption::Expiration(expiration) => self.expiration = expiration,
            ConfigOption::RefreshTokenExpiration(expiration) => {
                self.refresh_token_expiration = expiration
            }
            ConfigOption::SkipPaths(paths) => self.skip_paths = paths,
            ConfigOption::CommonSkipPaths => {
                for path in COMMON_SKIP_PATHS {
                    if !self.skip_paths.iter().any(|p| p == path) {
                        self.skip_paths.push(path.to_string());
                    }
                }
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.key.is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        if self.expiration.as_secs() == 0 {
            return Err(ConfigError::ZeroExpiration);
        }
        for lifetime in [self.expiration, self.refresh_token_expiration] {
            if lifetime > MAX_LIFETIME {
                return Err(ConfigError::LifetimeTooLong {
                    lifetime,
                    max: MAX_LIFETIME,
                });
            }
        }
        // Tokens carry whole seconds, so compare at that granularity.
        if self.refresh_token_expiration.as_secs() <= self.expiration.as_secs() {
            return Err(ConfigError::RefreshNotAfterAccess {
                access: self.expiration,
                refresh: self.refresh_token_expiration,
            });
        }
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn identity_key(&self) -> &str {
        &self.identity_key
    }

    /// Whether tokens must carry the identity claim.
    pub fn is_identity_required(&self) -> bool {
        !self.identity_key.is_empty()
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    pub fn refresh_token_expiration(&self) -> Duration {
        self.refresh_token_expiration
    }

    pub fn skip_paths(&self) -> &[String] {
        &self.skip_paths
    }

    /// Check `path` against this configuration's skip paths.
    pub fn is_path_skipped(&self, path: &str) -> bool {
        path::matches_any(&self.skip_paths, path)
    }
}

/// Install a new process-wide configuration.
///
/// The configuration is rebuilt from the defaults; settings from a previous
/// `init` are not carried over. On error the active configuration is left
/// untouched.
pub fn init<I>(key: impl Into<String>, options: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = ConfigOption>,
{
    let config = Config::new(key, options)?;
    debug!(
        identity_key = %config.identity_key,
        expiration_secs = config.expiration.as_secs(),
        refresh_expiration_secs = config.refresh_token_expiration.as_secs(),
        skip_paths = config.skip_paths.len(),
        "Token configuration initialized"
    );
    publish(config);
    Ok(())
}

/// Restore the built-in default configuration.
pub fn reset() {
    debug!("Token configuration reset to defaults");
    publish(Config::default());
}

fn publish(config: Config) {
    let mut guard = CONFIG.write().unwrap_or_else(PoisonError::into_inner);
    *guard = Arc::new(config);
}

/// Shared handle to the active configuration snapshot.
pub fn current() -> Arc<Config> {
    CONFIG
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Copy of the active configuration.
pub fn get_config() -> Config {
    current().as_ref().clone()
}

pub fn is_identity_required() -> bool {
    current().is_identity_required()
}

pub fn identity_key() -> String {
    current().identity_key.clone()
}

pub fn expiration() -> Duration {
    current().expiration
}

pub fn refresh_token_expiration() -> Duration {
    current().refresh_token_expiration
}

/// Copy of the active skip paths. Changing it has no effect on the
/// configuration.
pub fn skip_paths() -> Vec<String> {
    current().skip_paths.clone()
}
