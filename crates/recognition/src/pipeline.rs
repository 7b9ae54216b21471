//! Expiry-resolution pipeline.
//!
//! Takes the raw bytes of a grocery photo and an owner, and produces a
//! persisted purchase with a resolved expiry date per recognized item:
//!
//! 1. Recognize item names in the image. Failure here is fatal and nothing
//!    is persisted.
//! 2. Canonicalize each name and resolve it to a stable item UID. Duplicate
//!    names collapse to one entry.
//! 3. Open the purchase with the recognized items and hand the image off to
//!    background storage.
//! 4. Resolve expiry dates: stored durations first, then one batched
//!    suggestion call for the unknown names. Suggested durations are written
//!    back. A failed suggestion leaves those items without an expiry.
//! 5. Attach the resolved expiry records to the purchase.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use bestby_core::{
    CanonicalName, DurationString, ItemUid, PurchaseItems, RecognitionOutcome, StatusDesc,
    UserUid,
};

use crate::db::{DurationStore, RepositoryError};
use crate::identity::IdentityResolver;
use crate::images::{self, ImageStore};
use crate::ledger::PurchaseLedger;
use crate::recognizer::{DurationSource, Recognizer, RecognizerError};

/// Source of the reference instant expiry dates are computed from.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Fatal pipeline failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The image task failed; no purchase was recorded.
    #[error("image recognition failed: {0}")]
    Recognition(#[source] RecognizerError),

    /// A store fault during identity resolution or purchase persistence.
    #[error("storage fault: {0}")]
    Storage(#[from] RepositoryError),
}

impl PipelineError {
    /// HTTP status reported for this failure.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Recognition(_) => 422,
            Self::Storage(_) => 500,
        }
    }

    /// Reason code reported for this failure.
    #[must_use]
    pub const fn status_desc(&self) -> StatusDesc {
        match self {
            Self::Recognition(e) if e.is_parse_failure() => StatusDesc::ParseFail,
            Self::Recognition(_) => StatusDesc::GptPostError,
            Self::Storage(_) => StatusDesc::DbFault,
        }
    }
}

/// A completed recognition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// `CORRECT`, or a `DUMMY_*` code when fixtures produced the answer.
    pub status_desc: StatusDesc,
    pub result: RecognitionOutcome,
}

/// Everything the pipeline talks to.
pub struct PipelineParts {
    pub recognizer: Arc<dyn Recognizer>,
    pub duration_source: Arc<dyn DurationSource>,
    pub durations: Arc<dyn DurationStore>,
    pub identities: IdentityResolver,
    pub ledger: PurchaseLedger,
    pub images: Arc<dyn ImageStore>,
    pub clock: Arc<dyn Clock>,
}

/// The orchestrator. Cheap to clone; holds no per-request state.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineParts>,
}

impl Pipeline {
    #[must_use]
    pub fn new(parts: PipelineParts) -> Self {
        Self {
            inner: Arc::new(parts),
        }
    }

    /// Run the full pipeline for one image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Recognition`] if the image task fails, or
    /// [`PipelineError::Storage`] if identity resolution or purchase
    /// persistence hits a store fault.
    #[instrument(skip_all, fields(owner = %owner, image_bytes = image.len()))]
    pub async fn run(
        &self,
        owner: &UserUid,
        image: Vec<u8>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let parts = &*self.inner;

        // ReceivedImage -> Recognized
        let raw_names = parts
            .recognizer
            .recognize_image(&image)
            .await
            .map_err(|e| {
                warn!(error = %e, "Image recognition failed");
                PipelineError::Recognition(e)
            })?;

        // Recognized -> IdentitiesResolved
        let (mut items, entries) = self.resolve_identities(&raw_names).await?;
        let recognized: Vec<ItemUid> = items.uids().cloned().collect();

        let purchase_uid = parts.ledger.open(owner, &recognized).await?;
        images::spawn_save(parts.images.clone(), purchase_uid.clone(), image);

        // IdentitiesResolved -> ExpiryAttached
        let used_dummy_durations = self.attach_expiry(&mut items, &entries).await?;

        // ExpiryAttached -> Persisted
        parts
            .ledger
            .attach_expiry(&purchase_uid, &items.resolved_records())
            .await?;

        let status_desc = if parts.recognizer.is_dummy() {
            StatusDesc::DummyImageRecognizer
        } else if used_dummy_durations {
            StatusDesc::DummyExpiryDates
        } else {
            StatusDesc::Correct
        };

        info!(
            purchase_uid = %purchase_uid,
            items = items.len(),
            resolved = items.iter().filter(|(_, item)| item.expires_on.is_some()).count(),
            "Purchase resolved"
        );

        Ok(PipelineOutcome {
            status_desc,
            result: RecognitionOutcome {
                purchase_uid,
                items,
            },
        })
    }

    /// Map recognized names to item UIDs, dropping blanks and duplicates.
    async fn resolve_identities(
        &self,
        raw_names: &[String],
    ) -> Result<(PurchaseItems, Vec<(ItemUid, CanonicalName)>), PipelineError> {
        let mut items = PurchaseItems::new();
        let mut entries = Vec::with_capacity(raw_names.len());

        for raw in raw_names {
            let name = match CanonicalName::parse(raw) {
                Ok(name) => name,
                Err(e) => {
                    debug!(name = %raw, error = %e, "Dropping unusable recognized name");
                    continue;
                }
            };
            let uid = self.inner.identities.resolve_or_create(&name).await?;
            if items.insert(uid.clone(), name.as_str()) {
                entries.push((uid, name));
            }
        }

        Ok((items, entries))
    }

    /// Fill in expiry dates. Returns whether a dummy duration source answered.
    async fn attach_expiry(
        &self,
        items: &mut PurchaseItems,
        entries: &[(ItemUid, CanonicalName)],
    ) -> Result<bool, PipelineError> {
        let parts = &*self.inner;
        let now = parts.clock.now();
        let mut unknown = Vec::new();

        for (uid, name) in entries {
            match parts.durations.lookup(name).await? {
                Some(duration) => apply_duration(items, uid, duration, now),
                None => unknown.push((uid, name)),
            }
        }

        if unknown.is_empty() {
            return Ok(false);
        }

        let names: Vec<CanonicalName> = unknown.iter().map(|(_, name)| (*name).clone()).collect();
        let suggested = match parts.duration_source.suggest_durations(&names).await {
            Ok(suggested) => suggested,
            Err(e) => {
                warn!(error = %e, unknown = names.len(), "Duration suggestion failed, reporting items without expiry");
                return Ok(false);
            }
        };

        for (uid, name) in unknown {
            let Some(&duration) = suggested.get(name) else {
                debug!(name = %name, "No duration suggested");
                continue;
            };
            if let Err(e) = parts.durations.upsert(name, duration).await {
                warn!(name = %name, error = %e, "Failed to store suggested duration");
            }
            apply_duration(items, uid, duration, now);
        }

        Ok(parts.duration_source.is_dummy())
    }
}

fn apply_duration(
    items: &mut PurchaseItems,
    uid: &ItemUid,
    duration: DurationString,
    now: DateTime<Utc>,
) {
    match duration.expires_on(now) {
        Ok(date) => {
            items.set_expiry(uid, date);
        }
        Err(e) => warn!(item_uid = %uid, error = %e, "Duration out of range"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::db::{ItemInsert, ItemStore, MemoryStore, PurchaseStore};
    use crate::identity::RandomUids;
    use crate::images::NullImageStore;
    use crate::recognizer::{DummyDurations, DummyRecognizer};

    struct FixedNames(Vec<&'static str>);

    #[async_trait]
    impl Recognizer for FixedNames {
        async fn recognize_image(&self, _: &[u8]) -> Result<Vec<String>, RecognizerError> {
            Ok(self.0.iter().map(|s| (*s).to_string()).collect())
        }
    }

    struct Unparseable;

    #[async_trait]
    impl Recognizer for Unparseable {
        async fn recognize_image(&self, _: &[u8]) -> Result<Vec<String>, RecognizerError> {
            Err(RecognizerError::ResponseParse("no list".to_string()))
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Recognizer for Unreachable {
        async fn recognize_image(&self, _: &[u8]) -> Result<Vec<String>, RecognizerError> {
            Err(RecognizerError::Unauthorized("Invalid API key".to_string()))
        }
    }

    #[async_trait]
    impl DurationSource for Unreachable {
        async fn suggest_durations(
            &self,
            _: &[CanonicalName],
        ) -> Result<HashMap<CanonicalName, DurationString>, RecognizerError> {
            Err(RecognizerError::Api {
                status: 503,
                message: "overloaded".to_string(),
            })
        }
    }

    /// Live-looking duration source answering from a fixed table.
    struct Table(Vec<(&'static str, &'static str)>);

    #[async_trait]
    impl DurationSource for Table {
        async fn suggest_durations(
            &self,
            names: &[CanonicalName],
        ) -> Result<HashMap<CanonicalName, DurationString>, RecognizerError> {
            Ok(self
                .0
                .iter()
                .map(|(n, d)| (CanonicalName::parse(n).unwrap(), DurationString::parse(d).unwrap()))
                .filter(|(n, _)| names.contains(n))
                .collect())
        }
    }

    fn pool_timeout() -> RepositoryError {
        RepositoryError::Database(sqlx::Error::PoolTimedOut)
    }

    /// Item store that faults on one name and delegates the rest.
    struct FaultOn {
        store: Arc<MemoryStore>,
        name: &'static str,
    }

    #[async_trait]
    impl ItemStore for FaultOn {
        async fn find_by_name(
            &self,
            name: &CanonicalName,
        ) -> Result<Option<ItemUid>, RepositoryError> {
            if name.as_str() == self.name {
                return Err(pool_timeout());
            }
            self.store.find_by_name(name).await
        }

        async fn insert_if_absent(
            &self,
            uid: &ItemUid,
            name: &CanonicalName,
        ) -> Result<ItemInsert, RepositoryError> {
            self.store.insert_if_absent(uid, name).await
        }
    }

    /// Duration store whose lookups always fault.
    struct LookupFault;

    #[async_trait]
    impl DurationStore for LookupFault {
        async fn lookup(
            &self,
            _: &CanonicalName,
        ) -> Result<Option<DurationString>, RepositoryError> {
            Err(pool_timeout())
        }

        async fn upsert(&self, _: &CanonicalName, _: DurationString) -> Result<(), RepositoryError> {
            Err(pool_timeout())
        }
    }

    fn jan_first() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn name(raw: &str) -> CanonicalName {
        CanonicalName::parse(raw).unwrap()
    }

    fn pipeline(
        store: &Arc<MemoryStore>,
        recognizer: Arc<dyn Recognizer>,
        duration_source: Arc<dyn DurationSource>,
    ) -> Pipeline {
        Pipeline::new(PipelineParts {
            recognizer,
            duration_source,
            durations: store.clone(),
            identities: IdentityResolver::new(store.clone(), Arc::new(RandomUids)),
            ledger: PurchaseLedger::new(store.clone(), Arc::new(RandomUids)),
            images: Arc::new(NullImageStore),
            clock: Arc::new(FixedClock(jan_first())),
        })
    }

    fn owner() -> UserUid {
        UserUid::new("user-1")
    }

    #[tokio::test]
    async fn test_known_duration_resolves_from_reference_date() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert(&name("Apple"), DurationString::parse("2 W").unwrap())
            .await
            .unwrap();
        let pipeline = pipeline(
            &store,
            Arc::new(FixedNames(vec!["Apple"])),
            Arc::new(Unreachable),
        );

        let outcome = pipeline.run(&owner(), b"img".to_vec()).await.unwrap();

        assert_eq!(outcome.status_desc, StatusDesc::Correct);
        let (_, apple) = outcome.result.items.iter().next().unwrap();
        assert_eq!(apple.name, "Apple");
        assert_eq!(apple.expires_on, Some(date(2024, 1, 15)));
    }

    #[tokio::test]
    async fn test_zero_items_completes_with_empty_purchase() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(&store, Arc::new(FixedNames(vec![])), Arc::new(Unreachable));

        let outcome = pipeline.run(&owner(), Vec::new()).await.unwrap();

        assert_eq!(outcome.status_desc, StatusDesc::Correct);
        assert!(outcome.result.items.is_empty());
        let stored = store.get(&outcome.result.purchase_uid).await.unwrap().unwrap();
        assert!(stored.recognized_items.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_and_blank_names_collapse() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(
            &store,
            Arc::new(FixedNames(vec!["Apple", " Apple ", "", "Banana"])),
            Arc::new(Table(vec![("Apple", "1 W"), ("Banana", "5 D")])),
        );

        let outcome = pipeline.run(&owner(), Vec::new()).await.unwrap();

        let names: Vec<_> = outcome
            .result
            .items
            .iter()
            .map(|(_, item)| item.name.as_str())
            .collect();
        assert_eq!(names, vec!["Apple", "Banana"]);
        assert_eq!(store.item_count(), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_records_no_purchase() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(&store, Arc::new(Unparseable), Arc::new(Unreachable));

        let err = pipeline.run(&owner(), Vec::new()).await.unwrap_err();

        assert_eq!(err.status_code(), 422);
        assert_eq!(err.status_desc(), StatusDesc::ParseFail);
        assert_eq!(store.purchase_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_is_gpt_post_error() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(&store, Arc::new(Unreachable), Arc::new(Unreachable));

        let err = pipeline.run(&owner(), Vec::new()).await.unwrap_err();

        assert_eq!(err.status_code(), 422);
        assert_eq!(err.status_desc(), StatusDesc::GptPostError);
        assert_eq!(store.purchase_count(), 0);
    }

    #[tokio::test]
    async fn test_duration_failure_degrades_to_missing_expiry() {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert(&name("Apple"), DurationString::parse("1 W").unwrap())
            .await
            .unwrap();
        let pipeline = pipeline(
            &store,
            Arc::new(FixedNames(vec!["Apple", "Kale"])),
            Arc::new(Unreachable),
        );

        let outcome = pipeline.run(&owner(), Vec::new()).await.unwrap();

        let items: Vec<_> = outcome.result.items.iter().map(|(_, item)| item).collect();
        assert_eq!(items[0].expires_on, Some(date(2024, 1, 8)));
        assert_eq!(items[1].name, "Kale");
        assert_eq!(items[1].expires_on, None);

        let stored = store.get(&outcome.result.purchase_uid).await.unwrap().unwrap();
        assert_eq!(stored.recognized_items.len(), 2);
        assert_eq!(stored.expiry_results.len(), 1);
    }

    #[tokio::test]
    async fn test_suggested_durations_are_written_back() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(
            &store,
            Arc::new(FixedNames(vec!["Rice"])),
            Arc::new(Table(vec![("Rice", "1 Y")])),
        );

        let outcome = pipeline.run(&owner(), Vec::new()).await.unwrap();

        let (_, rice) = outcome.result.items.iter().next().unwrap();
        assert_eq!(rice.expires_on, Some(date(2025, 1, 1)));
        assert_eq!(
            store.lookup(&name("Rice")).await.unwrap(),
            Some(DurationString::parse("1 Y").unwrap())
        );
    }

    #[tokio::test]
    async fn test_dummy_status_precedence() {
        let store = Arc::new(MemoryStore::new());
        let both_dummy = pipeline(
            &store,
            Arc::new(DummyRecognizer::new()),
            Arc::new(DummyDurations::default()),
        );
        let outcome = both_dummy.run(&owner(), Vec::new()).await.unwrap();
        assert_eq!(outcome.status_desc, StatusDesc::DummyImageRecognizer);
        assert_eq!(outcome.result.items.len(), 3);

        let dummy_durations = pipeline(
            &store,
            Arc::new(FixedNames(vec!["Kale"])),
            Arc::new(DummyDurations::default()),
        );
        let outcome = dummy_durations.run(&owner(), Vec::new()).await.unwrap();
        assert_eq!(outcome.status_desc, StatusDesc::DummyExpiryDates);

        // Every name is now known, so the dummy source is never consulted.
        let outcome = dummy_durations.run(&owner(), Vec::new()).await.unwrap();
        assert_eq!(outcome.status_desc, StatusDesc::Correct);
    }
    #[tokio::test]
    async fn test_identity_fault_midway_fails_without_purchase() {
        let store = Arc::new(MemoryStore::new());
        let items = Arc::new(FaultOn {
            store: store.clone(),
            name: "Banana",
        });
        let pipeline = Pipeline::new(PipelineParts {
            recognizer: Arc::new(FixedNames(vec!["Apple", "Banana", "Cherry"])),
            duration_source: Arc::new(Table(vec![])),
            durations: store.clone(),
            identities: IdentityResolver::new(items, Arc::new(RandomUids)),
            ledger: PurchaseLedger::new(store.clone(), Arc::new(RandomUids)),
            images: Arc::new(NullImageStore),
            clock: Arc::new(FixedClock(jan_first())),
        });

        let err = pipeline.run(&owner(), Vec::new()).await.unwrap_err();

        assert!(matches!(err, PipelineError::Storage(_)));
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.status_desc(), StatusDesc::DbFault);
        assert_eq!(store.purchase_count(), 0);
        // Apple was resolved before the fault; Cherry was never reached.
        assert_eq!(store.item_count(), 1);
    }

    #[tokio::test]
    async fn test_duration_lookup_fault_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = Pipeline::new(PipelineParts {
            recognizer: Arc::new(FixedNames(vec!["Apple"])),
            duration_source: Arc::new(Table(vec![("Apple", "1 W")])),
            durations: Arc::new(LookupFault),
            identities: IdentityResolver::new(store.clone(), Arc::new(RandomUids)),
            ledger: PurchaseLedger::new(store.clone(), Arc::new(RandomUids)),
            images: Arc::new(NullImageStore),
            clock: Arc::new(FixedClock(jan_first())),
        });

        let err = pipeline.run(&owner(), Vec::new()).await.unwrap_err();

        assert_eq!(err.status_code(), 500);
        assert_eq!(err.status_desc(), StatusDesc::DbFault);

        // The first phase was already written; no expiry was attached.
        let purchases = store.purchases();
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].recognized_items.len(), 1);
        assert!(purchases[0].expiry_results.is_empty());
    }
}
