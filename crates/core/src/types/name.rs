//! Canonical item names.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`CanonicalName`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The input is empty or whitespace only.
    #[error("item name cannot be empty")]
    Empty,
    /// The input is too long.
    #[error("item name must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// The normalized textual identity of a grocery item.
///
/// Normalization trims the input and collapses runs of inner whitespace to a
/// single space. Case is preserved: `"Apple"` and `"APPLE"` are distinct
/// canonical names, matching what the recognizer returns.
///
/// ## Examples
///
/// ```
/// use bestby_core::CanonicalName;
///
/// let name = CanonicalName::parse("  Greek   yogurt ").unwrap();
/// assert_eq!(name.as_str(), "Greek yogurt");
///
/// assert!(CanonicalName::parse("   ").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct CanonicalName(String);

impl CanonicalName {
    /// Maximum length of a canonical name in characters.
    pub const MAX_LENGTH: usize = 255;

    /// Normalize and validate a raw item name.
    ///
    /// # Errors
    ///
    /// Returns an error if the normalized name is empty or longer than
    /// [`Self::MAX_LENGTH`] characters.
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return Err(NameError::Empty);
        }
        if normalized.chars().count() > Self::MAX_LENGTH {
            return Err(NameError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        Ok(Self(normalized))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the name and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for CanonicalName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for CanonicalName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for CanonicalName {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for CanonicalName {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // Stored names were normalized on insert
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for CanonicalName {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_whitespace() {
        assert_eq!(CanonicalName::parse("Apple").unwrap().as_str(), "Apple");
        assert_eq!(
            CanonicalName::parse("\tChicken   thigh\n").unwrap().as_str(),
            "Chicken thigh"
        );
    }

    #[test]
    fn test_parse_preserves_case() {
        assert_ne!(
            CanonicalName::parse("APPLE").unwrap(),
            CanonicalName::parse("Apple").unwrap()
        );
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(CanonicalName::parse(""), Err(NameError::Empty));
        assert_eq!(CanonicalName::parse(" \t "), Err(NameError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = "a".repeat(CanonicalName::MAX_LENGTH + 1);
        assert!(matches!(
            CanonicalName::parse(&long),
            Err(NameError::TooLong { .. })
        ));
    }

    #[test]
    fn test_serde_transparent() {
        let name = CanonicalName::parse("Banana").unwrap();
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"Banana\"");
    }
}
