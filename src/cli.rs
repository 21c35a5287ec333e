//! CLI argument parsing, validation, and command handlers for the token tool.

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::error;

use crate::config::{
    Config, ConfigError, with_expiration, with_identity_key, with_refresh_token_expiration,
};
use crate::jwt::{Claims, TokenError};

/// Environment variable holding the signing secret. Removed once read.
pub const SECRET_ENV: &str = "JWT_SECRET";

/// Shortest signing secret the tool accepts, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Shape of the log lines written to stderr.
#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// Multi-line, human readable.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
    /// Single line per event.
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "bearer-auth", about = "Sign, verify and rotate bearer tokens")]
pub struct Args {
    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Name of the identity claim. An empty value disables the identity requirement
    #[arg(long, env = "BEARER_AUTH_IDENTITY_KEY", default_value = crate::config::DEFAULT_IDENTITY_KEY)]
    pub identity_key: String,

    /// Access token lifetime in seconds
    #[arg(long, env = "BEARER_AUTH_EXPIRATION", default_value = "7200")]
    pub expiration: u64,

    /// Refresh token lifetime in seconds
    #[arg(long, env = "BEARER_AUTH_REFRESH_EXPIRATION", default_value = "604800")]
    pub refresh_expiration: u64,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Sign a single access token
    Sign {
        /// Identity to embed in the token
        #[arg(long, default_value = "")]
        identity: String,

        /// Extra claim as key=value; values are parsed as JSON when possible
        #[arg(long = "claim", value_parser = parse_claim)]
        claims: Vec<(String, Value)>,
    },
    /// Sign an access/refresh token pair
    Pair {
        #[arg(long, default_value = "")]
        identity: String,
    },
    /// Verify a token and print its claims
    Verify { token: String },
    /// Exchange a refresh token for a new pair
    Refresh { refresh_token: String },
}

fn parse_claim(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("Claim must be key=value: {}", s))?;

    if key.is_empty() {
        return Err(format!("Claim name must not be empty: {}", s));
    }

    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    let builder = tracing_subscriber::fmt().with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

/// Signing secret from `JWT_SECRET`, or else from the trimmed contents of
/// `jwt_secret_file`. Logs the reason and returns `None` when neither yields
/// a secret of at least [`MIN_SECRET_LEN`] bytes.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = match (std::env::var(SECRET_ENV), jwt_secret_file) {
        (Ok(secret), _) => {
            // SAFETY: called from main before the runtime or any thread starts.
            unsafe { std::env::remove_var(SECRET_ENV) };
            secret
        }
        (Err(_), Some(path)) => secret_from_file(path)?,
        (Err(_), None) => {
            error!("No signing secret: set {SECRET_ENV} or pass --jwt-secret-file");
            return None;
        }
    };

    check_secret_len(secret)
}

fn secret_from_file(path: &str) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content.trim().to_string()),
        Err(e) => {
            error!(path = %path, error = %e, "Cannot read signing secret file");
            None
        }
    }
}

fn check_secret_len(secret: String) -> Option<String> {
    if secret.len() < MIN_SECRET_LEN {
        error!(
            len = secret.len(),
            min = MIN_SECRET_LEN,
            "Signing secret too short"
        );
        return None;
    }
    Some(secret)
}

/// Build the token configuration from validated arguments.
pub fn build_config(args: &Args, secret: String) -> Result<Config, ConfigError> {
    Config::new(
        secret,
        [
            with_identity_key(args.identity_key.as_str()),
            with_expiration(Duration::from_secs(args.expiration)),
            with_refresh_token_expiration(Duration::from_secs(args.refresh_expiration)),
        ],
    )
}

/// Run a subcommand and return its JSON output.
pub fn run_command(command: &Command, config: &Config) -> Result<Value, TokenError> {
    let output = match command {
        Command::Sign { identity, claims } => {
            let signed = if claims.is_empty() {
                config.sign(identity)?
            } else {
                let mut map: Claims = claims.iter().cloned().collect();
                if config.is_identity_required() {
                    map.insert(
                        config.identity_key().to_string(),
                        Value::String(identity.clone()),
                    );
                }
                config.sign_with_claims(map)?
            };
            serde_json::to_value(signed)
        }
        Command::Pair { identity } => serde_json::to_value(config.sign_tokens(identity)?),
        Command::Verify { token } => serde_json::to_value(config.get_claims(token)?),
        Command::Refresh { refresh_token } => {
            serde_json::to_value(config.refresh_tokens(refresh_token)?)
        }
    };

    // Serializing plain structs and maps into a Value cannot fail.
    Ok(output.unwrap_or(Value::Null))
}
