//! Item identity resolution.
//!
//! Maps a canonical name to a stable [`ItemUid`], creating one when the name
//! is new. Creation goes through the store's insert-if-absent primitive so two
//! requests racing on the same new name converge on one UID.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use bestby_core::{CanonicalName, ItemUid, random_uid};

use crate::db::{ItemInsert, ItemStore, RepositoryError};

/// Attempts at finding a free UID before giving up.
pub const MAX_UID_ATTEMPTS: usize = 8;

/// Source of candidate UIDs.
pub trait UidSource: Send + Sync {
    fn next_uid(&self) -> String;
}

/// Random fixed-length alphanumeric UIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomUids;

impl UidSource for RandomUids {
    fn next_uid(&self) -> String {
        random_uid()
    }
}

/// Resolves canonical names to item UIDs.
#[derive(Clone)]
pub struct IdentityResolver {
    items: Arc<dyn ItemStore>,
    uids: Arc<dyn UidSource>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(items: Arc<dyn ItemStore>, uids: Arc<dyn UidSource>) -> Self {
        Self { items, uids }
    }

    /// Return the UID for `name`, creating it if the name is new.
    ///
    /// Calling this twice for the same name, sequentially or concurrently,
    /// yields the same UID.
    ///
    /// # Errors
    ///
    /// Returns the store error on a storage fault, or
    /// `RepositoryError::Conflict` if no free UID was found.
    #[instrument(skip_all, fields(name = %name))]
    pub async fn resolve_or_create(&self, name: &CanonicalName) -> Result<ItemUid, RepositoryError> {
        if let Some(uid) = self.items.find_by_name(name).await? {
            return Ok(uid);
        }

        for _ in 0..MAX_UID_ATTEMPTS {
            let candidate = ItemUid::new(self.uids.next_uid());
            match self.items.insert_if_absent(&candidate, name).await? {
                ItemInsert::Inserted => {
                    debug!(item_uid = %candidate, "Created item identity");
                    return Ok(candidate);
                }
                ItemInsert::Existing(uid) => return Ok(uid),
                ItemInsert::UidTaken => warn!("Item UID collision, regenerating"),
            }
        }

        Err(RepositoryError::Conflict(format!(
            "no free item UID after {MAX_UID_ATTEMPTS} attempts"
        )))
    }
}
