//! Device authentication extractor.
//!
//! Clients authenticate every protected call with the `USERNAME` and
//! `BEARER-TOKEN` headers issued by `/register` or `/authraw`.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use tracing::{Span, debug};

use crate::db::DeviceSession;
use crate::error::{AppError, set_sentry_user};
use crate::services::auth::AuthError;
use crate::state::AppState;

pub const USERNAME_HEADER: &str = "username";
pub const BEARER_TOKEN_HEADER: &str = "bearer-token";

/// Extractor that requires an authenticated device.
///
/// Rejects with `403 LOGIN_REQUIRED` when the headers are missing or do not
/// match a registered device.
pub struct RequireDevice(pub DeviceSession);

impl FromRequestParts<AppState> for RequireDevice {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let (username, token) = device_credentials(&parts.headers).ok_or(AppError::LoginRequired)?;

        let session = state
            .auth()
            .authenticate(username, token)
            .await
            .map_err(|e| match e {
                AuthError::SessionInvalid => {
                    debug!(username, "Device token rejected");
                    AppError::LoginRequired
                }
                other => AppError::Auth(other),
            })?;

        Span::current().record("user_uid", session.user_uid.as_str());
        set_sentry_user(&session.user_uid, &session.username);

        Ok(Self(session))
    }
}

/// Read the username and device token headers.
fn device_credentials(headers: &HeaderMap) -> Option<(&str, &str)> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    Some((read(USERNAME_HEADER)?, read(BEARER_TOKEN_HEADER)?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_device_credentials() {
        let mut headers = HeaderMap::new();
        headers.insert("username", HeaderValue::from_static("alice"));
        assert!(device_credentials(&headers).is_none());

        headers.insert("bearer-token", HeaderValue::from_static(" tok "));
        assert_eq!(device_credentials(&headers).unwrap(), ("alice", "tok"));

        headers.insert("bearer-token", HeaderValue::from_static("  "));
        assert!(device_credentials(&headers).is_none());
    }
}
