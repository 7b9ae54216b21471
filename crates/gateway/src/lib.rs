//! Best By Buddy gateway.
//!
//! The public face of the backend. Registers users, issues per-device
//! tokens, and forwards authenticated recognition requests to the private
//! recognition service with the caller's internal identity attached.
//!
//! # Modules
//!
//! - [`services::auth`] - Password and device-token authentication
//! - [`core_client`] - HTTP client for the recognition service
//! - [`middleware`] - Request ids, rate limiting, device authentication
//! - [`db`] - `PostgreSQL` and in-memory account stores

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod core_client;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

use std::time::Duration;

use axum::{Router, extract::DefaultBodyLimit, http::Request};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::state::AppState;

/// Build the gateway router with tracing, request ids and the body limit.
///
/// Sentry layers are added by the binary. Rate limiting keys on the client
/// address, so serve with `into_make_service_with_connect_info`.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::routes())
        .layer(DefaultBodyLimit::max(config::max_request_bytes(
            state.max_image_bytes(),
        )))
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
