//! HTTP middleware stack for the gateway.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (assign the id forwarded to the core service)
//! 4. Rate limiting (governor, per route group)
//!
//! Device authentication is an extractor ([`RequireDevice`]) rather than a
//! layer so unauthenticated routes stay untouched.

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::RequireDevice;
pub use rate_limit::{api_rate_limiter, auth_rate_limiter, rate_limit_envelope};
pub use request_id::{REQUEST_ID_HEADER, RequestId, request_id_middleware};
