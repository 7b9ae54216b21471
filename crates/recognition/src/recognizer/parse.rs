//! Defensive extraction of structured data from free-form model answers.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use bestby_core::{CanonicalName, DurationString};

use super::RecognizerError;

/// Extract the first bracketed substring that parses as a JSON array of
/// strings.
///
/// Models often wrap the list in prose or code fences, so every `[` is tried
/// as a start and every later `]` as an end until one candidate parses.
///
/// # Errors
///
/// Returns [`RecognizerError::ResponseParse`] if no candidate parses.
pub fn parse_item_list(text: &str) -> Result<Vec<String>, RecognizerError> {
    for (start, _) in text.match_indices('[') {
        let tail = &text[start..];
        for (end, _) in tail.match_indices(']') {
            let candidate = &tail[..=end];
            if let Ok(items) = serde_json::from_str::<Vec<String>>(candidate) {
                return Ok(items);
            }
        }
    }

    Err(RecognizerError::ResponseParse(format!(
        "no JSON string list in response ({} chars)",
        text.len()
    )))
}

/// Parse a JSON object mapping item names to duration strings.
///
/// Keys are normalized to canonical names. Entries with a blank name, a
/// non-string value or a malformed duration are dropped with a warning; the
/// remaining entries are kept.
///
/// # Errors
///
/// Returns [`RecognizerError::ResponseParse`] if the text is not a JSON object.
pub fn parse_duration_map(
    text: &str,
) -> Result<HashMap<CanonicalName, DurationString>, RecognizerError> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| RecognizerError::ResponseParse(format!("duration answer is not JSON: {e}")))?;

    let Value::Object(entries) = value else {
        return Err(RecognizerError::ResponseParse(
            "duration answer is not a JSON object".to_string(),
        ));
    };

    let mut durations = HashMap::with_capacity(entries.len());
    for (raw_name, raw_duration) in entries {
        let Ok(name) = CanonicalName::parse(&raw_name) else {
            warn!(name = %raw_name, "Dropping duration with unusable item name");
            continue;
        };
        let parsed = raw_duration
            .as_str()
            .ok_or_else(|| "not a string".to_string())
            .and_then(|s| DurationString::parse(s).map_err(|e| e.to_string()));
        match parsed {
            Ok(duration) => {
                durations.insert(name, duration);
            }
            Err(reason) => {
                warn!(name = %name, %reason, "Dropping malformed suggested duration");
            }
        }
    }

    Ok(durations)
}
