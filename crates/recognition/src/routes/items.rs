//! `POST /itemuid`: resolve an explicit item name without image recognition.

use axum::{
    Form, Json,
    extract::{FromRequest, Request, State},
    http::header::CONTENT_TYPE,
    response::Response,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use bestby_core::{CanonicalName, ItemUid, StatusDesc};

use crate::error::{AppError, Result, envelope_response};
use crate::middleware::VerifiedIdentity;
use crate::state::AppState;

/// `{"ITEMNAME": "..."}` as JSON or form data.
#[derive(Debug, Deserialize)]
pub struct ItemNameRequest {
    #[serde(rename = "ITEMNAME", default)]
    pub item_name: Option<String>,
}

impl<S> FromRequest<S> for ItemNameRequest
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(request: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let is_json = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            Json::<Self>::from_request(request, state)
                .await
                .map(|Json(body)| body)
                .map_err(|e| AppError::BadRequest(e.body_text()))
        } else {
            Form::<Self>::from_request(request, state)
                .await
                .map(|Form(body)| body)
                .map_err(|e| AppError::BadRequest(e.body_text()))
        }
    }
}

#[derive(Debug, Serialize)]
struct ItemIdentity {
    #[serde(rename = "itemUID")]
    item_uid: ItemUid,
    name: CanonicalName,
}

/// Return the stable UID for `ITEMNAME`, creating one if the name is new.
#[instrument(skip_all, fields(user_uid = %identity.user_uid))]
pub async fn itemuid(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    request: ItemNameRequest,
) -> Result<Response> {
    let name = request
        .item_name
        .as_deref()
        .and_then(|raw| CanonicalName::parse(raw).ok())
        .ok_or(AppError::ItemNameMissing)?;

    let item_uid = state.identities().resolve_or_create(&name).await?;

    Ok(envelope_response(
        200,
        StatusDesc::Correct,
        ItemIdentity { item_uid, name },
    ))
}
