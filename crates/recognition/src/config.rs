//! Recognition service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CORE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `OPENAI_API_KEY` - External recognizer API key (only when a mode is `live`)
//!
//! ## Optional
//! - `CORE_HOST` - Bind address (default: 127.0.0.1)
//! - `CORE_PORT` - Listen port (default: 50002)
//! - `LOGIN_REQUIRED` - Verify internal identity headers (default: true)
//! - `RECOGNIZER_MODE` - `live` or `dummy` (default: live)
//! - `DURATION_SOURCE_MODE` - `live` or `dummy` (default: live)
//! - `OPENAI_BASE_URL` - Recognizer API base (default: <https://api.openai.com/v1>)
//! - `OPENAI_VISION_MODEL` - Image model (default: gpt-4o-mini)
//! - `OPENAI_TEXT_MODEL` - Duration model (default: gpt-4o-mini)
//! - `OPENAI_TIMEOUT_SECS` - Per-call timeout (default: 60)
//! - `IMAGE_DIR` - Directory for saved purchase images (default: savedimages)
//! - `MAX_IMAGE_BYTES` - Largest accepted request body (default: 10 MiB)
//! - `LOG_FORMAT` - `json` for structured logs, text otherwise
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_VISION_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Whether a strategy talks to the external recognizer or returns fixed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    Dummy,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "dummy" => Ok(Self::Dummy),
            other => Err(format!("expected 'live' or 'dummy', got '{other}'")),
        }
    }
}

/// Recognition service configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Reject requests without a verified internal identity
    pub login_required: bool,
    /// Image recognition strategy
    pub recognizer_mode: Mode,
    /// Duration suggestion strategy
    pub duration_source_mode: Mode,
    /// External recognizer configuration (present when any mode is live)
    pub openai: Option<OpenAiConfig>,
    /// Directory that receives saved purchase images
    pub image_dir: PathBuf,
    /// Largest accepted request body in bytes
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

/// External recognizer API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct OpenAiConfig {
    /// Bearer token for the recognizer API
    pub api_key: SecretString,
    /// API base URL, without the trailing `/chat/completions`
    pub base_url: Url,
    /// Model used for image understanding
    pub vision_model: String,
    /// Model used for duration suggestions
    pub text_model: String,
    /// Timeout applied to each call
    pub timeout: Duration,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url.as_str())
            .field("vision_model", &self.vision_model)
            .field("text_model", &self.text_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the recognizer API key fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("CORE_DATABASE_URL")?;
        let host = parse_env("CORE_HOST", "127.0.0.1")?;
        let port = parse_env("CORE_PORT", "50002")?;
        let login_required = parse_bool_env("LOGIN_REQUIRED", true)?;
        let recognizer_mode = parse_env("RECOGNIZER_MODE", "live")?;
        let duration_source_mode = parse_env("DURATION_SOURCE_MODE", "live")?;

        let openai = if recognizer_mode == Mode::Live || duration_source_mode == Mode::Live {
            Some(OpenAiConfig::from_env()?)
        } else {
            None
        };

        let image_dir = PathBuf::from(get_env_or_default("IMAGE_DIR", "savedimages"));
        let max_image_bytes = get_optional_env("MAX_IMAGE_BYTES")
            .map(|raw| {
                raw.parse::<usize>().map_err(|e| {
                    ConfigError::InvalidEnvVar("MAX_IMAGE_BYTES".to_string(), e.to_string())
                })
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_IMAGE_BYTES);
        let json_logs = get_optional_env("LOG_FORMAT").is_some_and(|f| f == "json");

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            database_url,
            host,
            port,
            login_required,
            recognizer_mode,
            duration_source_mode,
            openai,
            image_dir,
            max_image_bytes,
            json_logs,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl OpenAiConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = get_env_or_default("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL);
        let base_url = Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("OPENAI_BASE_URL".to_string(), e.to_string()))?;
        let timeout_secs: u64 = parse_env("OPENAI_TIMEOUT_SECS", "60")?;

        Ok(Self {
            api_key: get_validated_secret("OPENAI_API_KEY")?,
            base_url,
            vision_model: get_env_or_default("OPENAI_VISION_MODEL", DEFAULT_VISION_MODEL),
            text_model: get_env_or_default("OPENAI_TEXT_MODEL", DEFAULT_TEXT_MODEL),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
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

/// Parse a boolean flag, accepting `true/false`, `1/0` and `yes/no`.
fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = get_optional_env(key) else {
        return Ok(default);
    };
    parse_bool(&raw).ok_or_else(|| {
        ConfigError::InvalidEnvVar(key.to_string(), format!("expected a boolean, got '{raw}'"))
    })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
