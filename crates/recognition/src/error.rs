//! Unified error handling with Sentry integration.
//!
//! Every failure leaves the service as an [`Envelope`] whose HTTP status
//! equals its `STATUS_CODE`. Server-side faults are captured to Sentry before
//! responding and never expose internal details.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use bestby_core::{Envelope, StatusDesc};

use crate::db::RepositoryError;
use crate::pipeline::PipelineError;

/// Application-level error type for the recognition service.
#[derive(Debug, Error)]
pub enum AppError {
    /// The recognition pipeline failed.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// The internal identity headers were missing or did not verify.
    #[error("Internal identity rejected")]
    IdentityRejected,

    /// `/itemuid` was called without a usable item name.
    #[error("Item name missing")]
    ItemNameMissing,

    /// `/imgrecv` was called with an empty body.
    #[error("Image missing")]
    ImageMissing,

    /// The request body exceeded `MAX_IMAGE_BYTES`.
    #[error("Payload too large")]
    PayloadTooLarge,

    /// The request body could not be read or decoded.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    const fn status(&self) -> (u16, StatusDesc) {
        match self {
            Self::Pipeline(e) => (e.status_code(), e.status_desc()),
            Self::Database(_) => (500, StatusDesc::DbFault),
            Self::IdentityRejected => (403, StatusDesc::ServerOos),
            Self::ItemNameMissing => (400, StatusDesc::ItemNameMissing),
            Self::ImageMissing => (400, StatusDesc::ImgNotFound),
            Self::PayloadTooLarge => (413, StatusDesc::PayloadTooLarge),
            Self::BadRequest(_) => (400, StatusDesc::FormIncomplete),
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

/// Set the Sentry user context for the verified caller.
pub fn set_sentry_user(user_uid: &impl ToString, username: &str) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_uid.to_string()),
            username: Some(username.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::recognizer::RecognizerError;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        assert_eq!(AppError::ItemNameMissing.to_string(), "Item name missing");
        assert_eq!(
            AppError::Internal("boom".to_string()).to_string(),
            "Internal error: boom"
        );
    }

    #[tokio::test]
    async fn test_parse_failure_envelope() {
        let err = AppError::from(PipelineError::Recognition(RecognizerError::ResponseParse(
            "no list".to_string(),
        )));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["STATUS_CODE"], 422);
        assert_eq!(json["STATUS_DESC"], "PARSE_FAIL");
        assert!(json["DATA"].is_null());
    }

    #[tokio::test]
    async fn test_database_error_hides_details() {
        let err = AppError::from(RepositoryError::DataCorruption("secret detail".to_string()));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["STATUS_DESC"], "DB_FAULT");
        assert!(!json.to_string().contains("secret detail"));
    }

    #[test]
    fn test_identity_rejected_status() {
        let response = AppError::IdentityRejected.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
