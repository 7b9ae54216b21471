//! `POST /imgrecv`: run the expiry-resolution pipeline on one image.

use axum::{
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::StatusCode,
    response::Response,
};
use tracing::instrument;

use crate::error::{AppError, Result, envelope_response};
use crate::middleware::VerifiedIdentity;
use crate::state::AppState;

/// Recognize the groceries in the raw request body and record a purchase.
#[instrument(skip_all, fields(user_uid = %identity.user_uid))]
pub async fn imgrecv(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    let image = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::PayloadTooLarge
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    })?;
    if image.is_empty() {
        return Err(AppError::ImageMissing);
    }

    let outcome = state
        .pipeline()
        .run(&identity.user_uid, image.to_vec())
        .await?;

    Ok(envelope_response(200, outcome.status_desc, outcome.result))
}
