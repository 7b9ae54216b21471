//! The response envelope shared by the gateway and the core service.

use serde::{Deserialize, Serialize};

use super::status::StatusDesc;

/// `{"STATUS_CODE", "STATUS_DESC", "DATA"}` wrapper around every response body.
///
/// The HTTP status of a response always equals `status_code`. `status_desc`
/// is a plain string so the gateway can relay descriptions it does not know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "STATUS_CODE")]
    pub status_code: u16,
    #[serde(rename = "STATUS_DESC")]
    pub status_desc: String,
    #[serde(rename = "DATA")]
    pub data: T,
}

impl<T> Envelope<T> {
    /// Build an envelope from a status code, description and payload.
    #[must_use]
    pub fn new(status_code: u16, status_desc: StatusDesc, data: T) -> Self {
        Self {
            status_code,
            status_desc: status_desc.as_str().to_string(),
            data,
        }
    }

    /// Build a `200` envelope.
    #[must_use]
    pub fn ok(status_desc: StatusDesc, data: T) -> Self {
        Self::new(200, status_desc, data)
    }
}

impl Envelope<()> {
    /// Build an envelope with no payload (`"DATA": null`).
    #[must_use]
    pub fn empty(status_code: u16, status_desc: StatusDesc) -> Self {
        Self::new(status_code, status_desc, ())
    }
}
