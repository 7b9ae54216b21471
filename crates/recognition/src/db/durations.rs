//! Duration store backed by the `duration` column of `recognition.known_items`.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{instrument, warn};

use bestby_core::{CanonicalName, DurationString, ItemUid};

use super::{DurationStore, RepositoryError, is_unique_violation};

/// Attempts at creating a missing item row before giving up.
const MAX_UID_ATTEMPTS: usize = 8;

/// Repository for durable item durations.
#[derive(Clone)]
pub struct DurationRepository {
    pool: PgPool,
}

impl DurationRepository {
    /// Create a new duration repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DurationStore for DurationRepository {
    #[instrument(skip_all, fields(name = %name))]
    async fn lookup(&self, name: &CanonicalName) -> Result<Option<DurationString>, RepositoryError> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            r"
            SELECT duration FROM recognition.known_items
            WHERE name = $1
            ",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(raw) = row.and_then(|r| r.0) else {
            return Ok(None);
        };

        DurationString::parse(&raw)
            .map(Some)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid duration for {name}: {e}")))
    }

    /// Set the duration for a name, creating the item row if needed.
    ///
    /// Concurrent writers for the same name are last-write-wins.
    #[instrument(skip_all, fields(name = %name, duration = %duration))]
    async fn upsert(
        &self,
        name: &CanonicalName,
        duration: DurationString,
    ) -> Result<(), RepositoryError> {
        let duration = duration.to_string();

        for _ in 0..MAX_UID_ATTEMPTS {
            let result = sqlx::query(
                r"
                INSERT INTO recognition.known_items (item_uid, name, duration)
                VALUES ($1, $2, $3)
                ON CONFLICT (name) DO UPDATE
                SET duration = EXCLUDED.duration, updated_at = NOW()
                ",
            )
            .bind(ItemUid::generate())
            .bind(name)
            .bind(&duration)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => return Ok(()),
                // The candidate UID collided with another item's primary key
                Err(e) if is_unique_violation(&e) => {
                    warn!("Item UID collision during duration upsert, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RepositoryError::Conflict(format!(
            "no free item UID after {MAX_UID_ATTEMPTS} attempts"
        )))
    }
}
