//! Purchase ledger: records each recognition event exactly once.
//!
//! A purchase is written in two phases. [`PurchaseLedger::open`] persists the
//! recognized items as soon as identities are known, and
//! [`PurchaseLedger::attach_expiry`] later merges the resolved expiry dates.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use bestby_core::{ExpiryRecord, ItemUid, PurchaseUid, UserUid};

use crate::db::{PurchaseStore, RepositoryError};
use crate::identity::{MAX_UID_ATTEMPTS, UidSource};

#[derive(Clone)]
pub struct PurchaseLedger {
    purchases: Arc<dyn PurchaseStore>,
    uids: Arc<dyn UidSource>,
}

impl PurchaseLedger {
    #[must_use]
    pub fn new(purchases: Arc<dyn PurchaseStore>, uids: Arc<dyn UidSource>) -> Self {
        Self { purchases, uids }
    }

    /// Create a purchase under a fresh unique UID.
    ///
    /// # Errors
    ///
    /// Returns the store error on a storage fault, or
    /// `RepositoryError::Conflict` if no free UID was found.
    #[instrument(skip_all, fields(owner = %owner, items = items.len()))]
    pub async fn open(
        &self,
        owner: &UserUid,
        items: &[ItemUid],
    ) -> Result<PurchaseUid, RepositoryError> {
        for _ in 0..MAX_UID_ATTEMPTS {
            let candidate = PurchaseUid::new(self.uids.next_uid());
            if self.purchases.create(&candidate, owner, items).await? {
                info!(purchase_uid = %candidate, "Purchase recorded");
                return Ok(candidate);
            }
            warn!("Purchase UID collision, regenerating");
        }

        Err(RepositoryError::Conflict(format!(
            "no free purchase UID after {MAX_UID_ATTEMPTS} attempts"
        )))
    }

    /// Attach resolved expiry records to an open purchase.
    ///
    /// Records for items that already have a result are ignored.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the purchase does not exist.
    #[instrument(skip_all, fields(purchase_uid = %purchase, records = records.len()))]
    pub async fn attach_expiry(
        &self,
        purchase: &PurchaseUid,
        records: &[ExpiryRecord],
    ) -> Result<(), RepositoryError> {
        if records.is_empty() {
            return Ok(());
        }
        self.purchases.append_expiry(purchase, records).await
    }
}
