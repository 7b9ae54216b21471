//! Storage for the gateway.
//!
//! # Schema: `gateway`
//!
//! ## Tables
//!
//! - `users` - End users, password hashes and internal tokens
//! - `devices` - One row per authenticated device (token stored as SHA-256)
//!
//! # Migrations
//!
//! Migrations are stored in `crates/gateway/migrations/` and run via:
//! ```bash
//! cargo run -p bestby-cli -- migrate gateway
//! ```

pub mod accounts;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use bestby_core::{DeviceUid, UserUid};

pub use accounts::AccountRepository;
pub use memory::MemoryAccounts;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A user row as needed for password login.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub user_uid: UserUid,
    pub username: String,
    pub name: String,
    pub password_hash: String,
    pub internal_token: SecretString,
}

/// A user about to be registered.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_uid: UserUid,
    pub username: String,
    pub name: String,
    pub password_hash: String,
    pub internal_token: SecretString,
}

/// A device about to be registered.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub device_uid: DeviceUid,
    pub user_uid: UserUid,
    /// Hex SHA-256 of the device token; the token itself is never stored.
    pub token_hash: String,
    pub user_agent: Option<String>,
}

/// Outcome of inserting a user with their first device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserInsert {
    Inserted,
    UsernameTaken,
    /// A generated UID or token collided; retry with fresh ones.
    UidTaken,
}

/// An authenticated device together with its owner's internal identity.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub username: String,
    pub user_uid: UserUid,
    pub device_uid: DeviceUid,
    pub internal_token: SecretString,
}

/// User and device storage.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a user and their first device atomically.
    async fn create_user(
        &self,
        user: &NewUser,
        device: &NewDevice,
    ) -> Result<UserInsert, RepositoryError>;

    async fn find_user(&self, username: &str) -> Result<Option<UserRecord>, RepositoryError>;

    /// Register another device. Returns `false` on a UID or token collision.
    async fn add_device(&self, device: &NewDevice) -> Result<bool, RepositoryError>;

    /// Look up the device whose token hashes to `token_hash` for `username`
    /// and mark it as seen.
    async fn find_session(
        &self,
        username: &str,
        token_hash: &str,
    ) -> Result<Option<DeviceSession>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
