//! HTTP middleware stack for the recognition service.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. `TraceLayer` (request span)
//! 3. Request ID
//! 4. Body limit (`MAX_IMAGE_BYTES`)
//! 5. Internal identity (recognition routes only)

pub mod auth;
pub mod request_id;

pub use auth::{
    Authenticator, DenyAll, InternalCredentials, VerifiedIdentity, require_internal_identity,
};
pub use request_id::request_id_middleware;
