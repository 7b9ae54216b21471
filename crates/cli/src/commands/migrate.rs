//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! bb-cli migrate core
//! bb-cli migrate gateway
//! bb-cli migrate all
//! ```
//!
//! # Environment Variables
//!
//! - `CORE_DATABASE_URL` - `PostgreSQL` connection string for the recognition service
//! - `GATEWAY_DATABASE_URL` - `PostgreSQL` connection string for the gateway
//! - `DATABASE_URL` - Fallback for both
//!
//! Both migration sets may share one database: they live in separate schemas
//! with distinct versions and each ignores the other's applied migrations.
//!
//! # Migration Files
//!
//! Recognition migrations: `crates/recognition/migrations/`
//! Gateway migrations: `crates/gateway/migrations/`

use super::{CommandError, connect};

/// Run recognition service migrations.
pub async fn core() -> Result<(), CommandError> {
    let pool = connect("CORE_DATABASE_URL").await?;

    tracing::info!("Running recognition migrations...");
    let mut migrator = sqlx::migrate!("../recognition/migrations");
    migrator.set_ignore_missing(true).run(&pool).await?;

    tracing::info!("Recognition migrations complete");
    Ok(())
}

/// Run gateway migrations.
pub async fn gateway() -> Result<(), CommandError> {
    let pool = connect("GATEWAY_DATABASE_URL").await?;

    tracing::info!("Running gateway migrations...");
    let mut migrator = sqlx::migrate!("../gateway/migrations");
    migrator.set_ignore_missing(true).run(&pool).await?;

    tracing::info!("Gateway migrations complete");
    Ok(())
}
