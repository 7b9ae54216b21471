//! Purchase repository backed by `recognition.purchases`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, instrument};

use bestby_core::{ExpiryRecord, ItemUid, PurchaseUid, UserUid};

use super::{Purchase, PurchaseStore, RepositoryError};

/// Repository for purchase records.
#[derive(Clone)]
pub struct PurchaseRepository {
    pool: PgPool,
}

impl PurchaseRepository {
    /// Create a new purchase repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    purchase_uid: PurchaseUid,
    owner_user_uid: UserUid,
    recognized_items: Json<Vec<ItemUid>>,
    expiry_results: Json<BTreeMap<ItemUid, ExpiryRecord>>,
    created_at: DateTime<Utc>,
}

impl From<PurchaseRow> for Purchase {
    fn from(row: PurchaseRow) -> Self {
        Self {
            purchase_uid: row.purchase_uid,
            owner: row.owner_user_uid,
            recognized_items: row.recognized_items.0,
            expiry_results: row.expiry_results.0,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl PurchaseStore for PurchaseRepository {
    #[instrument(skip_all, fields(purchase_uid = %uid, items = items.len()))]
    async fn create(
        &self,
        uid: &PurchaseUid,
        owner: &UserUid,
        items: &[ItemUid],
    ) -> Result<bool, RepositoryError> {
        let inserted: Option<(PurchaseUid,)> = sqlx::query_as(
            r"
            INSERT INTO recognition.purchases (purchase_uid, owner_user_uid, recognized_items)
            VALUES ($1, $2, $3)
            ON CONFLICT (purchase_uid) DO NOTHING
            RETURNING purchase_uid
            ",
        )
        .bind(uid)
        .bind(owner)
        .bind(Json(items))
        .fetch_optional(&self.pool)
        .await?;

        debug!(created = inserted.is_some(), "Purchase insert attempted");
        Ok(inserted.is_some())
    }

    #[instrument(skip_all, fields(purchase_uid = %uid, records = records.len()))]
    async fn append_expiry(
        &self,
        uid: &PurchaseUid,
        records: &[ExpiryRecord],
    ) -> Result<(), RepositoryError> {
        let incoming: BTreeMap<&ItemUid, &ExpiryRecord> =
            records.iter().map(|r| (&r.item_uid, r)).collect();

        // Right-hand keys win in `||`, so existing results are never replaced
        let result = sqlx::query::<sqlx::Postgres>(
            r"
            UPDATE recognition.purchases
            SET expiry_results = $2::jsonb || expiry_results
            WHERE purchase_uid = $1
            ",
        )
        .bind(uid)
        .bind(Json(incoming))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(purchase_uid = %uid))]
    async fn get(&self, uid: &PurchaseUid) -> Result<Option<Purchase>, RepositoryError> {
        let row: Option<PurchaseRow> = sqlx::query_as(
            r"
            SELECT purchase_uid, owner_user_uid, recognized_items, expiry_results, created_at
            FROM recognition.purchases
            WHERE purchase_uid = $1
            ",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Purchase::from))
    }
}
