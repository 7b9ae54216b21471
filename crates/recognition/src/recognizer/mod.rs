//! External recognizer: image understanding and duration suggestion.
//!
//! Both tasks are strategies behind traits so the service can run against the
//! live API ([`OpenAiClient`]) or deterministic fixtures ([`DummyRecognizer`],
//! [`DummyDurations`]). Callers only ever see a [`RecognizerError`]; raw
//! transport failures never cross this boundary untyped.

mod dummy;
mod openai;
pub mod parse;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use bestby_core::{CanonicalName, DurationString};

pub use dummy::{DummyDurations, DummyRecognizer};
pub use openai::OpenAiClient;

/// Errors from the external recognizer.
#[derive(Debug, Error)]
pub enum RecognizerError {
    /// The request never completed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message or raw body.
        message: String,
    },

    /// Rate limited by the API.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The API key was rejected.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The API response envelope was not the expected shape.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// The model's answer could not be turned into structured data.
    #[error("response parse failure: {0}")]
    ResponseParse(String),

    /// The client could not be constructed.
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl RecognizerError {
    /// Whether the model answered but its content was unusable.
    ///
    /// Every other variant is a transport-class failure.
    #[must_use]
    pub const fn is_parse_failure(&self) -> bool {
        matches!(self, Self::ResponseParse(_))
    }
}

/// Turns an image into an ordered list of item names.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize grocery items in `image`.
    ///
    /// An empty list is a valid answer.
    async fn recognize_image(&self, image: &[u8]) -> Result<Vec<String>, RecognizerError>;

    /// Whether answers are fixtures rather than real recognition.
    fn is_dummy(&self) -> bool {
        false
    }
}

/// Suggests durations for item names with no stored duration.
#[async_trait]
pub trait DurationSource: Send + Sync {
    /// Suggest a duration per name. Names the source has no valid answer for
    /// are absent from the returned map.
    async fn suggest_durations(
        &self,
        names: &[CanonicalName],
    ) -> Result<HashMap<CanonicalName, DurationString>, RecognizerError>;

    /// Whether answers are fixtures rather than real suggestions.
    fn is_dummy(&self) -> bool {
        false
    }
}
