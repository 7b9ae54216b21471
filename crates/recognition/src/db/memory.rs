//! In-process store used by tests and local runs without a database.
//!
//! Mirrors the constraints of the `PostgreSQL` schema: unique item names,
//! unique item and purchase UIDs, append-only expiry results.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use bestby_core::{CanonicalName, DurationString, ExpiryRecord, ItemUid, PurchaseUid, UserUid};

use super::{DurationStore, ItemInsert, ItemStore, Purchase, PurchaseStore, RepositoryError};

#[derive(Default)]
struct State {
    items_by_name: HashMap<CanonicalName, ItemUid>,
    names_by_uid: HashMap<ItemUid, CanonicalName>,
    durations: HashMap<CanonicalName, DurationString>,
    purchases: BTreeMap<PurchaseUid, Purchase>,
}

/// Thread-safe in-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of distinct known items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.lock().items_by_name.len()
    }

    /// Number of stored purchases.
    #[must_use]
    pub fn purchase_count(&self) -> usize {
        self.lock().purchases.len()
    }

    /// All stored purchases, ordered by UID.
    #[must_use]
    pub fn purchases(&self) -> Vec<Purchase> {
        self.lock().purchases.values().cloned().collect()
    }
}

#[async_trait]
impl DurationStore for MemoryStore {
    async fn lookup(&self, name: &CanonicalName) -> Result<Option<DurationString>, RepositoryError> {
        Ok(self.lock().durations.get(name).copied())
    }

    async fn upsert(
        &self,
        name: &CanonicalName,
        duration: DurationString,
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if !state.items_by_name.contains_key(name) {
            let uid = loop {
                let candidate = ItemUid::generate();
                if !state.names_by_uid.contains_key(&candidate) {
                    break candidate;
                }
            };
            state.items_by_name.insert(name.clone(), uid.clone());
            state.names_by_uid.insert(uid, name.clone());
        }
        state.durations.insert(name.clone(), duration);
        Ok(())
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn find_by_name(&self, name: &CanonicalName) -> Result<Option<ItemUid>, RepositoryError> {
        Ok(self.lock().items_by_name.get(name).cloned())
    }

    async fn insert_if_absent(
        &self,
        uid: &ItemUid,
        name: &CanonicalName,
    ) -> Result<ItemInsert, RepositoryError> {
        let mut state = self.lock();
        if let Some(existing) = state.items_by_name.get(name) {
            return Ok(ItemInsert::Existing(existing.clone()));
        }
        if state.names_by_uid.contains_key(uid) {
            return Ok(ItemInsert::UidTaken);
        }
        state.items_by_name.insert(name.clone(), uid.clone());
        state.names_by_uid.insert(uid.clone(), name.clone());
        Ok(ItemInsert::Inserted)
    }
}

#[async_trait]
impl PurchaseStore for MemoryStore {
    async fn create(
        &self,
        uid: &PurchaseUid,
        owner: &UserUid,
        items: &[ItemUid],
    ) -> Result<bool, RepositoryError> {
        let mut state = self.lock();
        if state.purchases.contains_key(uid) {
            return Ok(false);
        }
        state.purchases.insert(
            uid.clone(),
            Purchase {
                purchase_uid: uid.clone(),
                owner: owner.clone(),
                recognized_items: items.to_vec(),
                expiry_results: BTreeMap::new(),
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn append_expiry(
        &self,
        uid: &PurchaseUid,
        records: &[ExpiryRecord],
    ) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        let purchase = state
            .purchases
            .get_mut(uid)
            .ok_or(RepositoryError::NotFound)?;
        for record in records {
            purchase
                .expiry_results
                .entry(record.item_uid.clone())
                .or_insert_with(|| record.clone());
        }
        Ok(())
    }

    async fn get(&self, uid: &PurchaseUid) -> Result<Option<Purchase>, RepositoryError> {
        Ok(self.lock().purchases.get(uid).cloned())
    }
}
