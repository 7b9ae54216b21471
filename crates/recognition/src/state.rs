//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::{CoreConfig, Mode};
use crate::db::{DurationRepository, ItemRepository, PurchaseRepository, UserRepository};
use crate::identity::{IdentityResolver, RandomUids};
use crate::images::DiskImageStore;
use crate::ledger::PurchaseLedger;
use crate::middleware::Authenticator;
use crate::pipeline::{Pipeline, PipelineParts, SystemClock};
use crate::recognizer::{
    DummyDurations, DummyRecognizer, DurationSource, OpenAiClient, Recognizer, RecognizerError,
};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateParts>,
}

/// Everything the handlers need, assembled by the caller.
pub struct StateParts {
    /// Verify internal identity headers on recognition routes
    pub login_required: bool,
    /// Largest accepted request body in bytes
    pub max_image_bytes: usize,
    /// Present in production; readiness checks round-trip through it
    pub pool: Option<PgPool>,
    pub pipeline: Pipeline,
    pub identities: IdentityResolver,
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    #[must_use]
    pub fn new(parts: StateParts) -> Self {
        Self {
            inner: Arc::new(parts),
        }
    }

    /// Wire the `PostgreSQL` stores and the configured recognizer strategies.
    ///
    /// # Errors
    ///
    /// Returns [`RecognizerError::Setup`] if a live strategy is selected
    /// without recognizer configuration or the HTTP client cannot be built.
    pub fn from_config(config: &CoreConfig, pool: PgPool) -> Result<Self, RecognizerError> {
        let live = match &config.openai {
            Some(openai) => Some(OpenAiClient::new(openai)?),
            None => None,
        };
        let missing_live =
            || RecognizerError::Setup("OPENAI_API_KEY is required in live mode".to_string());

        let recognizer: Arc<dyn Recognizer> = match config.recognizer_mode {
            Mode::Live => Arc::new(live.clone().ok_or_else(missing_live)?),
            Mode::Dummy => Arc::new(DummyRecognizer::new()),
        };
        let duration_source: Arc<dyn DurationSource> = match config.duration_source_mode {
            Mode::Live => Arc::new(live.ok_or_else(missing_live)?),
            Mode::Dummy => Arc::new(DummyDurations::default()),
        };

        let uids = Arc::new(RandomUids);
        let identities = IdentityResolver::new(Arc::new(ItemRepository::new(pool.clone())), uids.clone());
        let pipeline = Pipeline::new(PipelineParts {
            recognizer,
            duration_source,
            durations: Arc::new(DurationRepository::new(pool.clone())),
            identities: identities.clone(),
            ledger: PurchaseLedger::new(Arc::new(PurchaseRepository::new(pool.clone())), uids),
            images: Arc::new(DiskImageStore::new(config.image_dir.clone())),
            clock: Arc::new(SystemClock),
        });

        Ok(Self::new(StateParts {
            login_required: config.login_required,
            max_image_bytes: config.max_image_bytes,
            authenticator: Arc::new(UserRepository::new(pool.clone())),
            pool: Some(pool),
            pipeline,
            identities,
        }))
    }

    #[must_use]
    pub fn login_required(&self) -> bool {
        self.inner.login_required
    }

    #[must_use]
    pub fn max_image_bytes(&self) -> usize {
        self.inner.max_image_bytes
    }

    /// Get the database pool, if the service runs against `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    #[must_use]
    pub fn identities(&self) -> &IdentityResolver {
        &self.inner.identities
    }

    #[must_use]
    pub fn authenticator(&self) -> &dyn Authenticator {
        self.inner.authenticator.as_ref()
    }
}
