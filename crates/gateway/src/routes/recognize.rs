//! `POST /imgrecv`: forward a grocery photo to the recognition service.
//!
//! The image arrives either as the multipart field `IMG_DATA` or as a JSON
//! body `{"IMG_DATA": "<base64>"}`.

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{AppError, Result};
use crate::middleware::{RequestId, RequireDevice};
use crate::state::AppState;

use super::relay;

/// Field carrying the image in both request shapes.
const IMAGE_FIELD: &str = "IMG_DATA";

#[derive(Debug, Deserialize)]
struct ImagePayload {
    #[serde(rename = "IMG_DATA")]
    img_data: String,
}

/// Extract the image and relay the recognition result.
#[instrument(skip_all, fields(user_uid = %session.user_uid))]
pub async fn imgrecv(
    State(state): State<AppState>,
    RequireDevice(session): RequireDevice,
    RequestId(request_id): RequestId,
    request: Request,
) -> Result<Response> {
    let image = extract_image(request, &state).await?;
    if image.is_empty() {
        return Err(AppError::ImageMissing);
    }
    if image.len() > state.max_image_bytes() {
        return Err(AppError::PayloadTooLarge);
    }
    debug!(image_bytes = image.len(), "Image extracted");

    let reply = state
        .core()
        .recognize(&session, image, Some(request_id.as_str()))
        .await?;

    Ok(relay(reply))
}

/// Read the image from a multipart form or a base64 JSON body.
async fn extract_image(request: Request, state: &AppState) -> Result<Vec<u8>> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if is_multipart {
        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|_| AppError::ImageMissing)?;

        while let Some(field) = multipart.next_field().await.map_err(|e| body_error(e.status()))? {
            if field.name() == Some(IMAGE_FIELD) {
                let bytes = field.bytes().await.map_err(|e| body_error(e.status()))?;
                return Ok(bytes.to_vec());
            }
        }
        return Err(AppError::ImageMissing);
    }

    let body = Bytes::from_request(request, state)
        .await
        .map_err(|rejection| body_error(rejection.status()))?;
    let payload: ImagePayload =
        serde_json::from_slice(&body).map_err(|_| AppError::ImageMissing)?;

    STANDARD
        .decode(payload.img_data.trim())
        .map_err(|_| AppError::ImageMissing)
}

fn body_error(status: StatusCode) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::ImageMissing
    }
}
