//! Client for the private recognition service.
//!
//! The gateway forwards authenticated requests with the caller's internal
//! identity in the `USERNAME`, `USER-UID`, `DEVICE-UID` and `INTERNAL-TOKEN`
//! headers and relays whatever envelope comes back.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use bestby_core::Envelope;

use crate::config::GatewayConfig;
use crate::db::DeviceSession;

const USERNAME_HEADER: &str = "username";
const USER_UID_HEADER: &str = "user-uid";
const DEVICE_UID_HEADER: &str = "device-uid";
const INTERNAL_TOKEN_HEADER: &str = "internal-token";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Errors talking to the recognition service.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Client construction failed.
    #[error("core client setup failed: {0}")]
    Setup(String),

    /// Connection refused, timeout or any other transport failure.
    #[error("core service unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// The service answered with something that is not an envelope.
    #[error("invalid core response: {0}")]
    InvalidResponse(String),
}

/// An envelope relayed from the recognition service.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreReply {
    /// HTTP status the service answered with.
    pub status: u16,
    pub envelope: Envelope<serde_json::Value>,
}

/// The operations the gateway forwards.
#[async_trait]
pub trait CoreService: Send + Sync {
    /// Submit an image for recognition.
    async fn recognize(
        &self,
        session: &DeviceSession,
        image: Vec<u8>,
        request_id: Option<&str>,
    ) -> Result<CoreReply, CoreError>;

    /// Resolve an explicit item name to its UID.
    async fn item_uid(
        &self,
        session: &DeviceSession,
        item_name: &str,
        request_id: Option<&str>,
    ) -> Result<CoreReply, CoreError>;
}

/// HTTP client for the recognition service.
#[derive(Clone)]
pub struct CoreClient {
    inner: Arc<CoreClientInner>,
}

struct CoreClientInner {
    client: reqwest::Client,
    imgrecv_url: Url,
    itemuid_url: Url,
}

#[derive(Serialize)]
struct ItemNameBody<'a> {
    #[serde(rename = "ITEMNAME")]
    item_name: &'a str,
}

impl CoreClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Setup`] if the base URL cannot be joined or the
    /// HTTP client cannot be built.
    pub fn new(config: &GatewayConfig) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.core_timeout)
            .build()
            .map_err(|e| CoreError::Setup(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(CoreClientInner {
                client,
                imgrecv_url: endpoint(&config.core_url, "imgrecv")?,
                itemuid_url: endpoint(&config.core_url, "itemuid")?,
            }),
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<CoreReply, CoreError> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        let envelope: Envelope<serde_json::Value> = serde_json::from_slice(&body)
            .map_err(|e| CoreError::InvalidResponse(format!("status {status}: {e}")))?;

        if envelope.status_code != status {
            warn!(
                http_status = status,
                envelope_status = envelope.status_code,
                "Core envelope disagrees with HTTP status"
            );
        }

        debug!(status, desc = %envelope.status_desc, "Core replied");
        Ok(CoreReply { status, envelope })
    }
}

#[async_trait]
impl CoreService for CoreClient {
    #[instrument(skip_all, fields(user_uid = %session.user_uid, image_bytes = image.len()))]
    async fn recognize(
        &self,
        session: &DeviceSession,
        image: Vec<u8>,
        request_id: Option<&str>,
    ) -> Result<CoreReply, CoreError> {
        let request = self
            .inner
            .client
            .post(self.inner.imgrecv_url.clone())
            .headers(identity_headers(session, request_id)?)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image);

        self.send(request).await
    }

    #[instrument(skip_all, fields(user_uid = %session.user_uid))]
    async fn item_uid(
        &self,
        session: &DeviceSession,
        item_name: &str,
        request_id: Option<&str>,
    ) -> Result<CoreReply, CoreError> {
        let request = self
            .inner
            .client
            .post(self.inner.itemuid_url.clone())
            .headers(identity_headers(session, request_id)?)
            .json(&ItemNameBody { item_name });

        self.send(request).await
    }
}

/// Build the internal identity headers for a device session.
fn identity_headers(
    session: &DeviceSession,
    request_id: Option<&str>,
) -> Result<HeaderMap, CoreError> {
    let value = |raw: &str| {
        HeaderValue::from_str(raw)
            .map_err(|_| CoreError::Setup("identity is not a valid header value".to_string()))
    };

    let mut headers = HeaderMap::new();
    headers.insert(USERNAME_HEADER, value(&session.username)?);
    headers.insert(USER_UID_HEADER, value(session.user_uid.as_str())?);
    headers.insert(DEVICE_UID_HEADER, value(session.device_uid.as_str())?);

    let mut token = value(session.internal_token.expose_secret())?;
    token.set_sensitive(true);
    headers.insert(INTERNAL_TOKEN_HEADER, token);

    if let Some(id) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        headers.insert(REQUEST_ID_HEADER, id);
    }

    Ok(headers)
}

/// Append one path segment to the service base URL.
fn endpoint(base: &Url, segment: &str) -> Result<Url, CoreError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| CoreError::Setup(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use bestby_core::{DeviceUid, UserUid};

    use super::*;

    fn session() -> DeviceSession {
        DeviceSession {
            username: "alice".to_string(),
            user_uid: UserUid::new("u1"),
            device_uid: DeviceUid::new("d1"),
            internal_token: SecretString::from("tok".to_string()),
        }
    }

    #[test]
    fn test_endpoint_joins_segment() {
        let base = Url::parse("http://127.0.0.1:50002").unwrap();
        assert_eq!(
            endpoint(&base, "imgrecv").unwrap().as_str(),
            "http://127.0.0.1:50002/imgrecv"
        );

        let nested = Url::parse("http://core.internal/api/").unwrap();
        assert_eq!(
            endpoint(&nested, "itemuid").unwrap().as_str(),
            "http://core.internal/api/itemuid"
        );
    }

    #[test]
    fn test_identity_headers() {
        let headers = identity_headers(&session(), Some("req-1")).unwrap();

        assert_eq!(headers["username"], "alice");
        assert_eq!(headers["user-uid"], "u1");
        assert_eq!(headers["device-uid"], "d1");
        assert_eq!(headers["internal-token"], "tok");
        assert!(headers["internal-token"].is_sensitive());
        assert_eq!(headers["x-request-id"], "req-1");
    }

    #[test]
    fn test_identity_headers_without_request_id() {
        let headers = identity_headers(&session(), None).unwrap();
        assert!(!headers.contains_key("x-request-id"));
    }

    #[test]
    fn test_item_name_body_wire_name() {
        let json = serde_json::to_value(ItemNameBody { item_name: "Kale" }).unwrap();
        assert_eq!(json, serde_json::json!({"ITEMNAME": "Kale"}));
    }
}
