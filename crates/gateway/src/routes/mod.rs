//! HTTP route handlers for the gateway.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health        - Liveness
//! GET  /health/ready  - Readiness (database round-trip)
//!
//! # Auth (strict rate limit)
//! POST /register      - Create a user and their first device
//! POST /authraw       - Password login, issues a new device
//! POST /renewauth     - Check that a device token is still valid
//!
//! # Device required (API rate limit)
//! POST /imgrecv       - Forward an image to the recognition service
//! POST /itemuid       - Forward an explicit item name
//! ```

pub mod auth;
pub mod health;
pub mod items;
pub mod recognize;

use axum::{
    Json, Router,
    http::StatusCode,
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::core_client::CoreReply;
use crate::middleware::{api_rate_limiter, auth_rate_limiter, rate_limit_envelope};
use crate::state::AppState;

/// Create the full route table.
pub fn routes() -> Router<AppState> {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/authraw", post(auth::authraw))
        .route("/renewauth", post(auth::renewauth))
        .layer(auth_rate_limiter());

    let api_routes = Router::new()
        .route("/imgrecv", post(recognize::imgrecv))
        .route("/itemuid", post(items::itemuid))
        .layer(api_rate_limiter());

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(auth_routes.merge(api_routes).layer(map_response(rate_limit_envelope)))
}

/// Relay a core envelope with the status the core answered with.
fn relay(reply: CoreReply) -> Response {
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(reply.envelope)).into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use bestby_core::{Envelope, StatusDesc};

    use super::*;
    use crate::core_client::{CoreError, CoreService};
    use crate::db::{DeviceSession, MemoryAccounts};
    use crate::services::auth::AuthService;
    use crate::state::StateParts;

    struct EchoCore;

    #[async_trait]
    impl CoreService for EchoCore {
        async fn recognize(
            &self,
            _session: &DeviceSession,
            image: Vec<u8>,
            _request_id: Option<&str>,
        ) -> Result<CoreReply, CoreError> {
            Ok(CoreReply {
                status: 200,
                envelope: Envelope::ok(StatusDesc::Correct, serde_json::json!(image.len())),
            })
        }

        async fn item_uid(
            &self,
            _session: &DeviceSession,
            _item_name: &str,
            _request_id: Option<&str>,
        ) -> Result<CoreReply, CoreError> {
            Ok(CoreReply {
                status: 400,
                envelope: Envelope::new(400, StatusDesc::ItemNameMissing, serde_json::Value::Null),
            })
        }
    }

    fn app() -> Router {
        routes().with_state(AppState::new(StateParts {
            auth: AuthService::new(Arc::new(MemoryAccounts::new())),
            core: Arc::new(EchoCore),
            max_image_bytes: 1024,
            pool: None,
        }))
    }

    #[tokio::test]
    async fn test_health_needs_no_client_address() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_relay_keeps_core_status() {
        let reply = CoreReply {
            status: 422,
            envelope: Envelope::new(422, StatusDesc::ParseFail, serde_json::Value::Null),
        };
        let response = relay(reply);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
