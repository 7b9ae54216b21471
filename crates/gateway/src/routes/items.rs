//! `POST /itemuid`: forward an explicit item name to the recognition service.

use axum::{
    Form, Json,
    extract::{FromRequest, Request, State},
    http::header::CONTENT_TYPE,
    response::Response,
};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::middleware::{RequestId, RequireDevice};
use crate::state::AppState;

use super::relay;

/// `{"ITEMNAME": "..."}` as JSON or form data. Form posts may also use the
/// lowercase `itemname`.
#[derive(Debug, Deserialize)]
pub struct ItemNameRequest {
    #[serde(rename = "ITEMNAME", alias = "itemname", default)]
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
                .map_err(|_| AppError::FormIncomplete("ITEMNAME"))
        } else {
            Form::<Self>::from_request(request, state)
                .await
                .map(|Form(body)| body)
                .map_err(|_| AppError::FormIncomplete("ITEMNAME"))
        }
    }
}

/// Relay the core's answer for `ITEMNAME`.
///
/// Blank names are passed through so the recognition service decides how
/// to reject them.
#[instrument(skip_all, fields(user_uid = %session.user_uid))]
pub async fn itemuid(
    State(state): State<AppState>,
    RequireDevice(session): RequireDevice,
    RequestId(request_id): RequestId,
    request: ItemNameRequest,
) -> Result<Response> {
    let item_name = request.item_name.unwrap_or_default();

    let reply = state
        .core()
        .item_uid(&session, &item_name, Some(request_id.as_str()))
        .await?;

    Ok(relay(reply))
}
