//! HTTP route handlers for the recognition service.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health        - Liveness
//! GET  /health/ready  - Readiness (database round-trip)
//!
//! # Internal identity required
//! POST /imgrecv       - Raw image bytes in, purchase with expiry dates out
//! POST /itemuid       - Resolve or create the UID for an explicit item name
//! ```

pub mod health;
pub mod items;
pub mod recognize;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};

use crate::middleware::require_internal_identity;
use crate::state::AppState;

/// Create the full route table.
pub fn routes(state: &AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/imgrecv", post(recognize::imgrecv))
        .route("/itemuid", post(items::itemuid))
        .route_layer(from_fn_with_state(state.clone(), require_internal_identity));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .merge(protected)
}
