//! Registration and login.

use axum::{
    Form,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, header::USER_AGENT},
    response::Response,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use bestby_core::{DeviceUid, StatusDesc};

use crate::error::{AppError, Result, envelope_response};
use crate::middleware::RequireDevice;
use crate::services::auth::DeviceGrant;
use crate::state::AppState;

/// Registration form.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

/// Login form.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Credentials returned to a newly authenticated device.
#[derive(Debug, Serialize)]
struct DeviceCredentials {
    #[serde(rename = "DEVICE-TOKEN")]
    device_token: String,
    #[serde(rename = "DEVICE-UID")]
    device_uid: DeviceUid,
}

impl From<DeviceGrant> for DeviceCredentials {
    fn from(grant: DeviceGrant) -> Self {
        Self {
            device_token: grant.device_token.expose_secret().to_string(),
            device_uid: grant.device_uid,
        }
    }
}

/// Create a user and their first device.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: std::result::Result<Form<RegisterForm>, FormRejection>,
) -> Result<Response> {
    let Form(form) = form.map_err(|_| AppError::FormIncomplete("username"))?;
    let username = required(form.username.as_deref(), "username")?;
    let password = required(form.password.as_deref(), "password")?;
    let name = form.name.as_deref().unwrap_or_default();

    let grant = state
        .auth()
        .register(username, password, name, user_agent(&headers))
        .await?;

    Ok(envelope_response(
        200,
        StatusDesc::Correct,
        DeviceCredentials::from(grant),
    ))
}

/// Log in with a password and issue a new device.
#[instrument(skip_all)]
pub async fn authraw(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: std::result::Result<Form<LoginForm>, FormRejection>,
) -> Result<Response> {
    let Form(form) = form.map_err(|_| AppError::FormIncomplete("username"))?;
    let username = required(form.username.as_deref(), "username")?;
    let password = required(form.password.as_deref(), "password")?;

    let grant = state
        .auth()
        .login(username, password, user_agent(&headers))
        .await?;

    Ok(envelope_response(
        200,
        StatusDesc::Correct,
        DeviceCredentials::from(grant),
    ))
}

/// Confirm that the presented device token is still valid.
pub async fn renewauth(RequireDevice(_session): RequireDevice) -> Response {
    envelope_response(200, StatusDesc::Correct, ())
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or(AppError::FormIncomplete(field))
}

fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers.get(USER_AGENT).and_then(|v| v.to_str().ok())
}
