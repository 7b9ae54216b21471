//! Best By Buddy recognition service.
//!
//! The private core of the backend: turns grocery photos into purchases
//! with resolved expiry dates. Only the gateway talks to it, over loopback,
//! with internal identity headers.
//!
//! # Modules
//!
//! - [`pipeline`] - The expiry-resolution orchestrator
//! - [`recognizer`] - External recognizer client and fixtures
//! - [`identity`] - Canonical name to item UID resolution
//! - [`ledger`] - Two-phase purchase persistence
//! - [`db`] - `PostgreSQL` and in-memory stores

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod images;
pub mod ledger;
pub mod middleware;
pub mod pipeline;
pub mod recognizer;
pub mod routes;
pub mod state;

use std::time::Duration;

use axum::{Router, extract::DefaultBodyLimit, http::Request};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::state::AppState;

/// Build the service router with tracing, request ids and the body limit.
///
/// Sentry layers are added by the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::routes(&state))
        .layer(DefaultBodyLimit::max(state.max_image_bytes()))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        user_uid = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(|response: &axum::http::Response<_>, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record(
                        "latency_ms",
                        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    );
                    DefaultOnResponse::default().on_response(response, latency, span);
                }),
        )
        .with_state(state)
}
