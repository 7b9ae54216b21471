//! Integration test harness for Best By Buddy.
//!
//! Both services run in-process on in-memory stores. The recognition
//! service gets scripted recognizers and a fixed clock; the gateway talks
//! to it through [`InProcessCore`] instead of HTTP, so a test can follow
//! one request from device login to stored purchase.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p bestby-integration-tests
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Request, Response},
    middleware,
};
use chrono::{DateTime, TimeZone, Utc};
use secrecy::ExposeSecret;
use tower::ServiceExt;

use bestby_core::{CanonicalName, DurationString, Envelope, ItemUid};
use bestby_gateway::core_client::{CoreError, CoreReply, CoreService};
use bestby_gateway::db::{AccountStore, DeviceSession, MemoryAccounts};
use bestby_gateway::services::auth::AuthService;
use bestby_recognition::db::{
    DurationStore, ItemInsert, ItemStore, MemoryStore, RepositoryError,
};
use bestby_recognition::identity::{IdentityResolver, RandomUids};
use bestby_recognition::images::NullImageStore;
use bestby_recognition::ledger::PurchaseLedger;
use bestby_recognition::middleware::{Authenticator, DenyAll, InternalCredentials};
use bestby_recognition::pipeline::{FixedClock, Pipeline, PipelineParts};
use bestby_recognition::recognizer::{DurationSource, Recognizer, RecognizerError};

/// The instant every test pipeline runs at: 2024-01-01T00:00:00Z.
#[must_use]
pub fn scan_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

// =============================================================================
// Scripted recognizer strategies
// =============================================================================

/// What a [`ScriptedRecognizer`] answers.
#[derive(Debug, Clone)]
pub enum ImageScript {
    Items(Vec<String>),
    /// The recognizer answered with text that is not a list.
    Unparseable,
    /// The recognizer could not be reached.
    Unreachable,
}

/// Recognizer with a fixed answer.
#[derive(Debug, Clone)]
pub struct ScriptedRecognizer(pub ImageScript);

impl ScriptedRecognizer {
    pub fn items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ImageScript::Items(items.into_iter().map(Into::into).collect()))
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize_image(&self, _image: &[u8]) -> Result<Vec<String>, RecognizerError> {
        match &self.0 {
            ImageScript::Items(items) => Ok(items.clone()),
            ImageScript::Unparseable => Err(RecognizerError::ResponseParse(
                "expected a JSON array".to_string(),
            )),
            ImageScript::Unreachable => Err(RecognizerError::Api {
                status: 503,
                message: "upstream unavailable".to_string(),
            }),
        }
    }
}

/// Duration source with a fixed table, or one that always fails.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDurations {
    table: HashMap<String, String>,
    fail: bool,
}

impl ScriptedDurations {
    /// Answer with `pairs`; names not listed are left out of the answer.
    pub fn table<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            table: pairs
                .into_iter()
                .map(|(name, duration)| (name.to_string(), duration.to_string()))
                .collect(),
            fail: false,
        }
    }

    /// Fail every request.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            table: HashMap::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl DurationSource for ScriptedDurations {
    async fn suggest_durations(
        &self,
        names: &[CanonicalName],
    ) -> Result<HashMap<CanonicalName, DurationString>, RecognizerError> {
        if self.fail {
            return Err(RecognizerError::RateLimited(60));
        }
        Ok(names
            .iter()
            .filter_map(|name| {
                let raw = self.table.get(name.as_str())?;
                Some((name.clone(), DurationString::parse(raw).ok()?))
            })
            .collect())
    }
}

// =============================================================================
// Recognition service harness
// =============================================================================

/// Options for building the recognition service.
pub struct CoreOptions {
    pub recognizer: Arc<dyn Recognizer>,
    pub duration_source: Arc<dyn DurationSource>,
    pub login_required: bool,
    pub authenticator: Arc<dyn Authenticator>,
    pub max_image_bytes: usize,
}

impl CoreOptions {
    /// No login, generous body limit, the given strategies.
    pub fn new(
        recognizer: impl Recognizer + 'static,
        duration_source: impl DurationSource + 'static,
    ) -> Self {
        Self {
            recognizer: Arc::new(recognizer),
            duration_source: Arc::new(duration_source),
            login_required: false,
            authenticator: Arc::new(DenyAll),
            max_image_bytes: 1024 * 1024,
        }
    }
}

/// An in-process recognition service.
#[derive(Clone)]
pub struct CoreHarness {
    pub store: Arc<MemoryStore>,
    pub router: Router,
}

impl CoreHarness {
    #[must_use]
    pub fn new(options: CoreOptions) -> Self {
        Self::with_store(options, Arc::new(MemoryStore::new()))
    }

    /// Build on an existing store, e.g. one pre-seeded with durations.
    #[must_use]
    pub fn with_store(options: CoreOptions, store: Arc<MemoryStore>) -> Self {
        Self::with_stores(options, store.clone(), store.clone(), store)
    }

    /// Build with separate item and duration stores in front of `store`,
    /// e.g. wrappers that inject faults. Purchases always go to `store`.
    #[must_use]
    pub fn with_stores(
        options: CoreOptions,
        items: Arc<dyn ItemStore>,
        durations: Arc<dyn DurationStore>,
        store: Arc<MemoryStore>,
    ) -> Self {
        let uids = Arc::new(RandomUids);
        let identities = IdentityResolver::new(items, uids.clone());
        let pipeline = Pipeline::new(PipelineParts {
            recognizer: options.recognizer,
            duration_source: options.duration_source,
            durations,
            identities: identities.clone(),
            ledger: PurchaseLedger::new(store.clone(), uids),
            images: Arc::new(NullImageStore),
            clock: Arc::new(FixedClock(scan_instant())),
        });

        let state = bestby_recognition::state::AppState::new(bestby_recognition::state::StateParts {
            login_required: options.login_required,
            max_image_bytes: options.max_image_bytes,
            pool: None,
            pipeline,
            identities,
            authenticator: options.authenticator,
        });

        Self {
            store,
            router: bestby_recognition::app(state),
        }
    }
}

/// Item store that fails every lookup of one name and delegates the rest.
pub struct FaultingItems {
    pub store: Arc<MemoryStore>,
    pub fault_on: &'static str,
}

#[async_trait]
impl ItemStore for FaultingItems {
    async fn find_by_name(&self, name: &CanonicalName) -> Result<Option<ItemUid>, RepositoryError> {
        if name.as_str() == self.fault_on {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
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

/// Duration store that is unreachable.
pub struct FaultingDurations;

#[async_trait]
impl DurationStore for FaultingDurations {
    async fn lookup(&self, _name: &CanonicalName) -> Result<Option<DurationString>, RepositoryError> {
        Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn upsert(
        &self,
        _name: &CanonicalName,
        _duration: DurationString,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
    }
}

/// Verifies internal identities against the gateway's account store, the
/// way the `PostgreSQL` directory does.
pub struct AccountsAuthenticator(pub Arc<MemoryAccounts>);

#[async_trait]
impl Authenticator for AccountsAuthenticator {
    async fn verify(&self, credentials: &InternalCredentials) -> Result<bool, RepositoryError> {
        let user = self
            .0
            .find_user(&credentials.username)
            .await
            .map_err(|e| RepositoryError::Conflict(e.to_string()))?;

        Ok(user.is_some_and(|user| {
            user.user_uid == credentials.user_uid
                && user.internal_token.expose_secret()
                    == credentials.internal_token.expose_secret()
        }))
    }
}

// =============================================================================
// Gateway harness
// =============================================================================

/// [`CoreService`] that dispatches into an in-process recognition router.
pub struct InProcessCore {
    router: Router,
}

impl InProcessCore {
    #[must_use]
    pub const fn new(router: Router) -> Self {
        Self { router }
    }

    async fn forward(
        &self,
        uri: &str,
        session: &DeviceSession,
        content_type: &str,
        body: Vec<u8>,
        request_id: Option<&str>,
    ) -> Result<CoreReply, CoreError> {
        let mut builder = Request::post(uri)
            .header("content-type", content_type)
            .header("username", session.username.as_str())
            .header("user-uid", session.user_uid.as_str())
            .header("device-uid", session.device_uid.as_str())
            .header("internal-token", session.internal_token.expose_secret());
        if let Some(id) = request_id {
            builder = builder.header("x-request-id", id);
        }
        let request = builder
            .body(Body::from(body))
            .map_err(|e| CoreError::Setup(e.to_string()))?;

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| CoreError::Setup(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| CoreError::InvalidResponse(e.to_string()))?;
        let envelope: Envelope<serde_json::Value> = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::InvalidResponse(e.to_string()))?;

        Ok(CoreReply { status, envelope })
    }
}

#[async_trait]
impl CoreService for InProcessCore {
    async fn recognize(
        &self,
        session: &DeviceSession,
        image: Vec<u8>,
        request_id: Option<&str>,
    ) -> Result<CoreReply, CoreError> {
        self.forward("/imgrecv", session, "application/octet-stream", image, request_id)
            .await
    }

    async fn item_uid(
        &self,
        session: &DeviceSession,
        item_name: &str,
        request_id: Option<&str>,
    ) -> Result<CoreReply, CoreError> {
        let body = serde_json::to_vec(&serde_json::json!({ "ITEMNAME": item_name }))
            .map_err(|e| CoreError::Setup(e.to_string()))?;
        self.forward("/itemuid", session, "application/json", body, request_id)
            .await
    }
}

/// [`CoreService`] whose every call fails as if the core were down.
pub struct UnreachableCore;

#[async_trait]
impl CoreService for UnreachableCore {
    async fn recognize(
        &self,
        _session: &DeviceSession,
        _image: Vec<u8>,
        _request_id: Option<&str>,
    ) -> Result<CoreReply, CoreError> {
        Err(CoreError::InvalidResponse("connection refused".to_string()))
    }

    async fn item_uid(
        &self,
        _session: &DeviceSession,
        _item_name: &str,
        _request_id: Option<&str>,
    ) -> Result<CoreReply, CoreError> {
        Err(CoreError::InvalidResponse("connection refused".to_string()))
    }
}

/// An in-process gateway.
///
/// Requests reach [`Self::router`] from a loopback peer, the way they do
/// behind a reverse proxy on the same host, so `x-forwarded-for` picks the
/// client address. [`Self::router_from`] connects from any other peer.
pub struct GatewayHarness {
    pub accounts: Arc<MemoryAccounts>,
    pub router: Router,
    app: Router,
}

impl GatewayHarness {
    /// Gateway in front of `core`, sharing `accounts` with it.
    #[must_use]
    pub fn new(accounts: Arc<MemoryAccounts>, core: Arc<dyn CoreService>) -> Self {
        let state = bestby_gateway::state::AppState::new(bestby_gateway::state::StateParts {
            auth: AuthService::new(accounts.clone()),
            core,
            max_image_bytes: 1024 * 1024,
            pool: None,
        });
        let app = bestby_gateway::app(state);

        Self {
            accounts,
            router: connected_from(app.clone(), SocketAddr::from(([127, 0, 0, 1], 40000))),
            app,
        }
    }

    /// The gateway as seen by connections from `peer`.
    #[must_use]
    pub fn router_from(&self, peer: SocketAddr) -> Router {
        connected_from(self.app.clone(), peer)
    }

    /// Gateway and recognition service wired together with internal
    /// authentication enabled.
    #[must_use]
    pub fn with_core(
        recognizer: impl Recognizer + 'static,
        duration_source: impl DurationSource + 'static,
    ) -> (Self, CoreHarness) {
        let accounts = Arc::new(MemoryAccounts::new());
        let mut options = CoreOptions::new(recognizer, duration_source);
        options.login_required = true;
        options.authenticator = Arc::new(AccountsAuthenticator(accounts.clone()));
        let core = CoreHarness::new(options);

        let gateway = Self::new(accounts, Arc::new(InProcessCore::new(core.router.clone())));
        (gateway, core)
    }
}

/// Attach the connection info `axum::serve` would provide for `peer`.
fn connected_from(app: Router, peer: SocketAddr) -> Router {
    app.layer(middleware::map_request(move |mut request: Request<Body>| async move {
        request.extensions_mut().insert(ConnectInfo(peer));
        request
    }))
}

// =============================================================================
// Request helpers
// =============================================================================

/// Send `request` through `router`.
///
/// # Panics
///
/// Panics if the router fails, which an axum router never does.
pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router
        .clone()
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {})
}

/// Read a response body as JSON.
///
/// # Panics
///
/// Panics if the body cannot be read or is not JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap_or_else(|e| panic!("failed to read body: {e}"));
    serde_json::from_slice(&bytes).unwrap_or_else(|e| panic!("body is not JSON: {e}"))
}
