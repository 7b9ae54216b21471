//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::GatewayConfig;
use crate::core_client::{CoreClient, CoreError, CoreService};
use crate::db::AccountRepository;
use crate::services::auth::AuthService;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<StateParts>,
}

/// Everything the handlers need, assembled by the caller.
pub struct StateParts {
    pub auth: AuthService,
    pub core: Arc<dyn CoreService>,
    /// Largest accepted decoded image in bytes
    pub max_image_bytes: usize,
    /// Present in production; readiness checks round-trip through it
    pub pool: Option<PgPool>,
}

impl AppState {
    #[must_use]
    pub fn new(parts: StateParts) -> Self {
        Self {
            inner: Arc::new(parts),
        }
    }

    /// Wire the `PostgreSQL` account store and the HTTP core client.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Setup`] if the core client cannot be built.
    pub fn from_config(config: &GatewayConfig, pool: PgPool) -> Result<Self, CoreError> {
        Ok(Self::new(StateParts {
            auth: AuthService::new(Arc::new(AccountRepository::new(pool.clone()))),
            core: Arc::new(CoreClient::new(config)?),
            max_image_bytes: config.max_image_bytes,
            pool: Some(pool),
        }))
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn core(&self) -> &dyn CoreService {
        self.inner.core.as_ref()
    }

    #[must_use]
    pub fn max_image_bytes(&self) -> usize {
        self.inner.max_image_bytes
    }

    /// Get the database pool, if the gateway runs against `PostgreSQL`.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }
}
