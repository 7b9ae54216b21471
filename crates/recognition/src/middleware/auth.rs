//! Internal identity verification.
//!
//! The gateway forwards every request with `USERNAME`, `USER-UID`,
//! `DEVICE-UID` and `INTERNAL-TOKEN` headers. [`require_internal_identity`]
//! checks them through an [`Authenticator`] and inserts a
//! [`VerifiedIdentity`] extension for the handlers, or rejects the request
//! with `403 SERVER_OOS`.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::Response,
};
use secrecy::SecretString;
use tracing::{Span, debug};

use bestby_core::{DeviceUid, UserUid};

use crate::db::RepositoryError;
use crate::error::{AppError, set_sentry_user};
use crate::state::AppState;

pub const USERNAME_HEADER: &str = "username";
pub const USER_UID_HEADER: &str = "user-uid";
pub const DEVICE_UID_HEADER: &str = "device-uid";
pub const INTERNAL_TOKEN_HEADER: &str = "internal-token";

/// Identity claimed by the gateway on behalf of an end user.
#[derive(Debug)]
pub struct InternalCredentials {
    pub username: String,
    pub user_uid: UserUid,
    pub device_uid: Option<DeviceUid>,
    pub internal_token: SecretString,
}

impl InternalCredentials {
    /// Read credentials from request headers.
    ///
    /// Returns `None` if the username, user UID or token is missing or blank.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let username = header_str(headers, USERNAME_HEADER)?;
        let user_uid = header_str(headers, USER_UID_HEADER)?;
        let internal_token = header_str(headers, INTERNAL_TOKEN_HEADER)?;
        let device_uid = header_str(headers, DEVICE_UID_HEADER);

        Some(Self {
            username: username.to_string(),
            user_uid: UserUid::new(user_uid),
            device_uid: device_uid.map(DeviceUid::new),
            internal_token: SecretString::from(internal_token.to_string()),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Checks internal credentials against the user directory.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn verify(&self, credentials: &InternalCredentials) -> Result<bool, RepositoryError>;
}

/// Admits nobody. Used when login is required but no directory is wired.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl Authenticator for DenyAll {
    async fn verify(&self, _credentials: &InternalCredentials) -> Result<bool, RepositoryError> {
        Ok(false)
    }
}

/// The caller a request runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub user_uid: UserUid,
    pub username: Option<String>,
    pub device_uid: Option<DeviceUid>,
}

impl VerifiedIdentity {
    /// Identity used when login is not required (empty user UID).
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            user_uid: UserUid::new(""),
            username: None,
            device_uid: None,
        }
    }
}

/// Middleware that verifies the internal identity headers.
///
/// # Errors
///
/// Returns [`AppError::IdentityRejected`] for missing or wrong credentials
/// and [`AppError::Database`] if the directory cannot be queried.
pub async fn require_internal_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = if state.login_required() {
        let credentials =
            InternalCredentials::from_headers(request.headers()).ok_or(AppError::IdentityRejected)?;

        if !state.authenticator().verify(&credentials).await? {
            debug!(username = %credentials.username, "Internal identity rejected");
            return Err(AppError::IdentityRejected);
        }

        set_sentry_user(&credentials.user_uid, &credentials.username);
        VerifiedIdentity {
            user_uid: credentials.user_uid,
            username: Some(credentials.username),
            device_uid: credentials.device_uid,
        }
    } else {
        VerifiedIdentity::anonymous()
    };

    Span::current().record("user_uid", identity.user_uid.as_str());
    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for VerifiedIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AppError::IdentityRejected)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;
    use secrecy::ExposeSecret;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_credentials_from_headers() {
        let map = headers(&[
            ("username", "alice"),
            ("user-uid", "u1"),
            ("device-uid", "d1"),
            ("internal-token", "tok"),
        ]);

        let credentials = InternalCredentials::from_headers(&map).unwrap();
        assert_eq!(credentials.username, "alice");
        assert_eq!(credentials.user_uid.as_str(), "u1");
        assert_eq!(credentials.device_uid.unwrap().as_str(), "d1");
        assert_eq!(credentials.internal_token.expose_secret(), "tok");
    }

    #[test]
    fn test_credentials_require_token() {
        let map = headers(&[("username", "alice"), ("user-uid", "u1")]);
        assert!(InternalCredentials::from_headers(&map).is_none());

        let blank = headers(&[("username", " "), ("user-uid", "u1"), ("internal-token", "t")]);
        assert!(InternalCredentials::from_headers(&blank).is_none());
    }

    #[test]
    fn test_anonymous_identity_has_empty_uid() {
        assert_eq!(VerifiedIdentity::anonymous().user_uid.as_str(), "");
    }
}
