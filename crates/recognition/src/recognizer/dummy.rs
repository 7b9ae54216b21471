//! Deterministic recognizer fixtures for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;

use bestby_core::{CanonicalName, DurationString, DurationUnit};

use super::{DurationSource, Recognizer, RecognizerError};

/// Items returned for every image.
const DUMMY_ITEMS: &[&str] = &["APPLE", "BANANA", "PAPAYA"];

/// Recognizer that ignores the image and returns a fixed item list.
#[derive(Debug, Clone, Default)]
pub struct DummyRecognizer {
    items: Option<Vec<String>>,
}

impl DummyRecognizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `items` instead of the default fixture.
    #[must_use]
    pub fn with_items<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: Some(items.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl Recognizer for DummyRecognizer {
    async fn recognize_image(&self, _image: &[u8]) -> Result<Vec<String>, RecognizerError> {
        Ok(self.items.clone().unwrap_or_else(|| {
            DUMMY_ITEMS.iter().map(|s| (*s).to_string()).collect()
        }))
    }

    fn is_dummy(&self) -> bool {
        true
    }
}

/// Duration source that answers every name with the same duration.
#[derive(Debug, Clone, Copy)]
pub struct DummyDurations {
    duration: DurationString,
}

impl DummyDurations {
    #[must_use]
    pub const fn new(duration: DurationString) -> Self {
        Self { duration }
    }
}

impl Default for DummyDurations {
    fn default() -> Self {
        Self::new(DurationString::new(1, DurationUnit::Week))
    }
}

#[async_trait]
impl DurationSource for DummyDurations {
    async fn suggest_durations(
        &self,
        names: &[CanonicalName],
    ) -> Result<HashMap<CanonicalName, DurationString>, RecognizerError> {
        Ok(names
            .iter()
            .map(|name| (name.clone(), self.duration))
            .collect())
    }

    fn is_dummy(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dummy_recognizer_default_items() {
        let items = DummyRecognizer::new().recognize_image(b"").await.unwrap();
        assert_eq!(items, vec!["APPLE", "BANANA", "PAPAYA"]);
    }

    #[tokio::test]
    async fn test_dummy_durations_cover_every_name() {
        let names = vec![
            CanonicalName::parse("Kale").unwrap(),
            CanonicalName::parse("Rice").unwrap(),
        ];
        let map = DummyDurations::default()
            .suggest_durations(&names)
            .await
            .unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.values().all(|d| d.to_string() == "1 W"));
    }
}
