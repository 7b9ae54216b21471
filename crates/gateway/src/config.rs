//! Gateway configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `GATEWAY_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `GATEWAY_HOST` - Bind address (default: 0.0.0.0)
//! - `GATEWAY_PORT` - Listen port (default: 50000)
//! - `CORE_URL` - Recognition service base URL (default: <http://127.0.0.1:50002>)
//! - `CORE_TIMEOUT_SECS` - Per-request timeout towards the core (default: 120)
//! - `MAX_IMAGE_BYTES` - Largest accepted decoded image (default: 10 MiB)
//! - `LOG_FORMAT` - `json` for structured logs, text otherwise
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_CORE_URL: &str = "http://127.0.0.1:50002";
const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Base URL of the recognition service
    pub core_url: Url,
    /// Timeout for one forwarded request
    pub core_timeout: Duration,
    /// Largest accepted decoded image in bytes
    pub max_image_bytes: usize,
    /// Emit JSON logs instead of text
    pub json_logs: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let core_url = get_env_or_default("CORE_URL", DEFAULT_CORE_URL);
        let core_url = Url::parse(&core_url)
            .map_err(|e| ConfigError::InvalidEnvVar("CORE_URL".to_string(), e.to_string()))?;
        let core_timeout_secs: u64 = parse_env("CORE_TIMEOUT_SECS", "120")?;

        Ok(Self {
            database_url: get_database_url("GATEWAY_DATABASE_URL")?,
            host: parse_env("GATEWAY_HOST", "0.0.0.0")?,
            port: parse_env("GATEWAY_PORT", "50000")?,
            core_url,
            core_timeout: Duration::from_secs(core_timeout_secs),
            max_image_bytes: get_optional_env("MAX_IMAGE_BYTES")
                .map(|raw| {
                    raw.parse::<usize>().map_err(|e| {
                        ConfigError::InvalidEnvVar("MAX_IMAGE_BYTES".to_string(), e.to_string())
                    })
                })
                .transpose()?
                .unwrap_or(DEFAULT_MAX_IMAGE_BYTES),
            json_logs: get_optional_env("LOG_FORMAT").is_some_and(|f| f == "json"),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_optional_env("SENTRY_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            sentry_traces_sample_rate: get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.1),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Largest accepted request body: a base64 encoded image plus headroom.
    #[must_use]
    pub const fn max_request_bytes(&self) -> usize {
        max_request_bytes(self.max_image_bytes)
    }
}

/// Request body limit for a given decoded image limit.
#[must_use]
pub const fn max_request_bytes(max_image_bytes: usize) -> usize {
    (max_image_bytes / 3 + 1)
        .saturating_mul(4)
        .saturating_add(64 * 1024)
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
