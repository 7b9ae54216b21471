//! Item identity repository backed by `recognition.known_items`.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use bestby_core::{CanonicalName, ItemUid};

use super::{ItemInsert, ItemStore, RepositoryError};

/// Repository for item identities.
#[derive(Clone)]
pub struct ItemRepository {
    pool: PgPool,
}

impl ItemRepository {
    /// Create a new item repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ItemStore for ItemRepository {
    #[instrument(skip_all, fields(name = %name))]
    async fn find_by_name(&self, name: &CanonicalName) -> Result<Option<ItemUid>, RepositoryError> {
        let row: Option<(ItemUid,)> = sqlx::query_as(
            r"
            SELECT item_uid FROM recognition.known_items
            WHERE name = $1
            ",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.0))
    }

    #[instrument(skip_all, fields(name = %name))]
    async fn insert_if_absent(
        &self,
        uid: &ItemUid,
        name: &CanonicalName,
    ) -> Result<ItemInsert, RepositoryError> {
        // Either unique constraint may fire; both are expected races
        let inserted: Option<(ItemUid,)> = sqlx::query_as(
            r"
            INSERT INTO recognition.known_items (item_uid, name)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING item_uid
            ",
        )
        .bind(uid)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        if inserted.is_some() {
            debug!(item_uid = %uid, "Inserted known item");
            return Ok(ItemInsert::Inserted);
        }

        match self.find_by_name(name).await? {
            Some(existing) => Ok(ItemInsert::Existing(existing)),
            None => Ok(ItemInsert::UidTaken),
        }
    }
}
