//! Unified error handling with Sentry integration.
//!
//! Gateway failures leave as an [`Envelope`] whose HTTP status equals its
//! `STATUS_CODE`, the same shape the recognition service uses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use bestby_core::{Envelope, StatusDesc};

use crate::core_client::CoreError;
use crate::db::RepositoryError;
use crate::services::auth::AuthError;

/// Application-level error type for the gateway.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    #[error("Core service error: {0}")]
    Core(#[from] CoreError),

    /// Protected route called without a valid device session.
    #[error("Login required")]
    LoginRequired,

    /// A required form field was missing or blank.
    #[error("Form incomplete: {0}")]
    FormIncomplete(&'static str),

    /// No image could be extracted from the request.
    #[error("Image missing")]
    ImageMissing,

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> (u16, StatusDesc) {
        match self {
            Self::Auth(e) => match e {
                AuthError::InvalidUsername(_) => (400, StatusDesc::InvalidUsername),
                AuthError::UnknownUser => (403, StatusDesc::InvalidUsername),
                AuthError::IncorrectAuth => (403, StatusDesc::IncorrectAuth),
                AuthError::UsernameExists => (403, StatusDesc::UsernameExists),
                AuthError::WeakPassword(_) => (400, StatusDesc::WeakPassword),
                AuthError::SessionInvalid => (403, StatusDesc::LoginRequired),
                AuthError::Repository(_) => (500, StatusDesc::DbFault),
                AuthError::UidExhausted(_) | AuthError::PasswordHash => {
                    (500, StatusDesc::InternalError)
                }
            },
            Self::Database(_) => (500, StatusDesc::DbFault),
            Self::Core(_) => (500, StatusDesc::CoreDown),
            Self::LoginRequired => (403, StatusDesc::LoginRequired),
            Self::FormIncomplete(_) => (400, StatusDesc::FormIncomplete),
            Self::ImageMissing => (400, StatusDesc::ImgNotFound),
            Self::PayloadTooLarge => (413, StatusDesc::PayloadTooLarge),
            Self::RateLimited => (429, StatusDesc::RateLimited),
            Self::Internal(_) => (500, StatusDesc::InternalError),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (code, desc) = self.status();

        // Capture server errors to Sentry
        if code >= 500 {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        envelope_response(code, desc, ())
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Build a response whose HTTP status matches the envelope's status code.
pub fn envelope_response<T: Serialize>(code: u16, desc: StatusDesc, data: T) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(Envelope::new(code, desc, data))).into_response()
}

/// Set the Sentry user context for the authenticated caller.
pub fn set_sentry_user(user_uid: &impl ToString, username: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_uid.to_string()),
            username: Some(username.to_string()),
            ..Default::default()
        }));
    });
}
