//! Storage for the recognition service.
//!
//! # Schema: `recognition`
//!
//! ## Tables
//!
//! - `known_items` - Canonical item names, their UIDs and durable durations
//! - `purchases` - One row per recognition event (two-phase write)
//!
//! The service also reads `gateway.users` to verify internal identities.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/recognition/migrations/` and run via:
//! ```bash
//! cargo run -p bestby-cli -- migrate core
//! ```
//!
//! Every store is reached through a trait so the pipeline can run against
//! `PostgreSQL` in production and [`MemoryStore`] in tests.

pub mod durations;
pub mod items;
pub mod memory;
pub mod purchases;
pub mod users;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use bestby_core::{CanonicalName, DurationString, ExpiryRecord, ItemUid, PurchaseUid, UserUid};

pub use durations::DurationRepository;
pub use items::ItemRepository;
pub use memory::MemoryStore;
pub use purchases::PurchaseRepository;
pub use users::UserRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation not explained by an expected race.
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Result of an insert-if-absent on the item table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemInsert {
    /// The candidate row was written.
    Inserted,
    /// Another writer already owns this name; its UID is returned.
    Existing(ItemUid),
    /// The candidate UID belongs to a different name.
    UidTaken,
}

/// A stored recognition event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    pub purchase_uid: PurchaseUid,
    pub owner: UserUid,
    /// Immutable once created.
    pub recognized_items: Vec<ItemUid>,
    /// Append-only per item UID.
    pub expiry_results: BTreeMap<ItemUid, ExpiryRecord>,
    pub created_at: DateTime<Utc>,
}

/// Canonical name to duration mapping.
///
/// `lookup` distinguishes an expected miss (`Ok(None)`) from a storage fault
/// (`Err`). Concurrent upserts for one name are last-write-wins.
#[async_trait]
pub trait DurationStore: Send + Sync {
    async fn lookup(&self, name: &CanonicalName) -> Result<Option<DurationString>, RepositoryError>;

    async fn upsert(
        &self,
        name: &CanonicalName,
        duration: DurationString,
    ) -> Result<(), RepositoryError>;
}

/// Canonical name to item UID mapping with an insert-if-absent primitive.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn find_by_name(&self, name: &CanonicalName) -> Result<Option<ItemUid>, RepositoryError>;

    /// Insert `(uid, name)` unless either already exists.
    async fn insert_if_absent(
        &self,
        uid: &ItemUid,
        name: &CanonicalName,
    ) -> Result<ItemInsert, RepositoryError>;
}

/// Durable purchase records.
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Create a purchase row. Returns `false` if the UID is already taken.
    async fn create(
        &self,
        uid: &PurchaseUid,
        owner: &UserUid,
        items: &[ItemUid],
    ) -> Result<bool, RepositoryError>;

    /// Merge expiry records into an existing purchase without overwriting
    /// keys that are already present.
    ///
    /// Returns [`RepositoryError::NotFound`] if the purchase does not exist.
    async fn append_expiry(
        &self,
        uid: &PurchaseUid,
        records: &[ExpiryRecord],
    ) -> Result<(), RepositoryError>;

    async fn get(&self, uid: &PurchaseUid) -> Result<Option<Purchase>, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Whether an sqlx error is a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
