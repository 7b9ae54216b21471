//! Subcommand implementations.

pub mod durations;
pub mod items;
pub mod migrate;
pub mod purchases;

use bestby_core::{DurationError, NameError};
use bestby_recognition::db::RepositoryError;
use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

/// Errors shared by the CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Invalid item name: {0}")]
    InvalidName(#[from] NameError),

    #[error("Invalid duration: {0}")]
    InvalidDuration(#[from] DurationError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot encode output: {0}")]
    Output(#[from] serde_json::Error),
}

/// Connect using `key`, falling back to the generic `DATABASE_URL`.
pub async fn connect(key: &'static str) -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var(key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar(key))?;

    tracing::info!("Connecting to database ({key})...");
    Ok(bestby_recognition::db::create_pool(&database_url).await?)
}
