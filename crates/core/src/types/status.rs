//! Status descriptions returned alongside every status code.
//!
//! Clients branch on the `STATUS_DESC` string, so the wire spellings below are
//! part of the public contract and must not change.

use serde::{Deserialize, Serialize};

/// Human-readable reason code carried in the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusDesc {
    /// Request completed normally.
    #[serde(rename = "CORRECT")]
    Correct,
    /// Items came from the deterministic image recognizer.
    #[serde(rename = "DUMMY_IMAGE_RECOGNISER")]
    DummyImageRecognizer,
    /// Unknown durations came from the deterministic duration source.
    #[serde(rename = "DUMMY_EXPIRY_DATES")]
    DummyExpiryDates,
    /// The recognizer answered with text that could not be parsed.
    #[serde(rename = "PARSE_FAIL")]
    ParseFail,
    /// The recognizer could not be reached or rejected the request.
    #[serde(rename = "GPT_POST_ERROR")]
    GptPostError,
    /// The backing store failed.
    #[serde(rename = "DB_FAULT")]
    DbFault,
    /// Internal authentication failed between gateway and core.
    #[serde(rename = "SERVER_OOS")]
    ServerOos,
    /// End-user authentication is missing or invalid.
    #[serde(rename = "LOGIN_REQUIRED")]
    LoginRequired,
    /// Registration attempted with a taken username.
    #[serde(rename = "USERNAME_EXISTS")]
    UsernameExists,
    /// Login attempted with an unknown username.
    #[serde(rename = "INVALID_USERNAME")]
    InvalidUsername,
    /// Login attempted with a wrong password.
    #[serde(rename = "INCORRECT_AUTH")]
    IncorrectAuth,
    /// Registration password does not meet requirements.
    #[serde(rename = "WEAK_PASSWORD")]
    WeakPassword,
    /// Registration or login form is missing a field.
    #[serde(rename = "FORM_INCOMPLETE")]
    FormIncomplete,
    /// No image was found in the request.
    #[serde(rename = "IMG_NOT_FOUND")]
    ImgNotFound,
    /// The explicit item route was called without a usable name.
    #[serde(rename = "ITEM_NAME_MISSING")]
    ItemNameMissing,
    /// The core service could not be reached from the gateway.
    #[serde(rename = "CORE_DOWN")]
    CoreDown,
    /// The request body exceeds the configured limit.
    #[serde(rename = "PAYLOAD_TOO_LARGE")]
    PayloadTooLarge,
    /// The caller exceeded its request quota.
    #[serde(rename = "RATE_LIMITED")]
    RateLimited,
    /// Unexpected server-side fault.
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl StatusDesc {
    /// The wire spelling of this description.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Correct => "CORRECT",
            Self::DummyImageRecognizer => "DUMMY_IMAGE_RECOGNISER",
            Self::DummyExpiryDates => "DUMMY_EXPIRY_DATES",
            Self::ParseFail => "PARSE_FAIL",
            Self::GptPostError => "GPT_POST_ERROR",
            Self::DbFault => "DB_FAULT",
            Self::ServerOos => "SERVER_OOS",
            Self::LoginRequired => "LOGIN_REQUIRED",
            Self::UsernameExists => "USERNAME_EXISTS",
            Self::InvalidUsername => "INVALID_USERNAME",
            Self::IncorrectAuth => "INCORRECT_AUTH",
            Self::WeakPassword => "WEAK_PASSWORD",
            Self::FormIncomplete => "FORM_INCOMPLETE",
            Self::ImgNotFound => "IMG_NOT_FOUND",
            Self::ItemNameMissing => "ITEM_NAME_MISSING",
            Self::CoreDown => "CORE_DOWN",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::RateLimited => "RATE_LIMITED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for StatusDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_matches_as_str() {
        for desc in [
            StatusDesc::Correct,
            StatusDesc::DummyImageRecognizer,
            StatusDesc::ParseFail,
            StatusDesc::GptPostError,
            StatusDesc::ServerOos,
            StatusDesc::CoreDown,
        ] {
            let json = serde_json::to_string(&desc).unwrap();
            assert_eq!(json, format!("\"{}\"", desc.as_str()));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusDesc::ParseFail.to_string(), "PARSE_FAIL");
    }
}
