//! Duration strings and expiry date arithmetic.
//!
//! A duration string is the compact `"<count> <unit>"` encoding stored for each
//! known item, e.g. `"2 W"` or `"-1 D"`. The unit letter is one of `D`, `W`,
//! `M` or `Y` and is matched case-insensitively. Only the duration is durable;
//! the absolute expiry date is derived per purchase from the scan instant.
//!
//! Month and year arithmetic clamps the day-of-month to the end of the target
//! month, so `"1 M"` from January 31st lands on the last day of February.

use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors that can occur when parsing or applying a [`DurationString`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    /// The input string is empty.
    #[error("duration cannot be empty")]
    Empty,
    /// The input is not a count followed by a unit.
    #[error("malformed duration: {0}")]
    Malformed(String),
    /// The count is not an integer.
    #[error("invalid duration count: {0}")]
    InvalidCount(String),
    /// The unit is not one of D, W, M or Y.
    #[error("invalid duration unit: {0}")]
    InvalidUnit(String),
    /// Applying the duration leaves the supported calendar range.
    #[error("duration {0} is out of calendar range")]
    OutOfRange(String),
}

/// Granularity of a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DurationUnit {
    Day,
    Week,
    Month,
    Year,
}

impl DurationUnit {
    /// The canonical upper-case letter for this unit.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Day => 'D',
            Self::Week => 'W',
            Self::Month => 'M',
            Self::Year => 'Y',
        }
    }

    fn parse(token: &str) -> Result<Self, DurationError> {
        match token.trim().to_ascii_uppercase().as_str() {
            "D" => Ok(Self::Day),
            "W" => Ok(Self::Week),
            "M" => Ok(Self::Month),
            "Y" => Ok(Self::Year),
            _ => Err(DurationError::InvalidUnit(token.to_string())),
        }
    }
}

/// A validated `"<count> <unit>"` duration.
///
/// ## Examples
///
/// ```
/// use bestby_core::DurationString;
/// use chrono::NaiveDate;
///
/// let two_weeks: DurationString = "2 W".parse().unwrap();
/// let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// assert_eq!(
///     two_weeks.add_to(start).unwrap(),
///     NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
/// );
///
/// assert!("two weeks".parse::<DurationString>().is_err());
/// assert!("3 Q".parse::<DurationString>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DurationString {
    count: i32,
    unit: DurationUnit,
}

impl DurationString {
    /// Create a duration from its parts.
    #[must_use]
    pub const fn new(count: i32, unit: DurationUnit) -> Self {
        Self { count, unit }
    }

    /// Parse a duration string.
    ///
    /// Accepts `"<count> <unit>"` as well as the compact `"<count><unit>"`
    /// form. Surrounding whitespace is ignored and the unit is matched
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, has extra tokens, has a
    /// non-integer count or an unknown unit.
    pub fn parse(s: &str) -> Result<Self, DurationError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(DurationError::Empty);
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let (count, unit) = match tokens.as_slice() {
            [count, unit] => (*count, *unit),
            [compact] => {
                let split_at = compact
                    .char_indices()
                    .last()
                    .map_or(0, |(idx, _)| idx);
                if split_at == 0 {
                    return Err(DurationError::Malformed(s.to_string()));
                }
                compact.split_at(split_at)
            }
            _ => return Err(DurationError::Malformed(s.to_string())),
        };

        let count = count
            .parse::<i32>()
            .map_err(|_| DurationError::InvalidCount(count.to_string()))?;
        let unit = DurationUnit::parse(unit)?;

        Ok(Self { count, unit })
    }

    /// The signed number of units.
    #[must_use]
    pub const fn count(&self) -> i32 {
        self.count
    }

    /// The unit granularity.
    #[must_use]
    pub const fn unit(&self) -> DurationUnit {
        self.unit
    }

    /// Add this duration to a calendar date.
    ///
    /// # Errors
    ///
    /// Returns [`DurationError::OutOfRange`] if the result leaves the range
    /// `chrono` can represent.
    pub fn add_to(&self, date: NaiveDate) -> Result<NaiveDate, DurationError> {
        let count = i64::from(self.count);
        let out_of_range = || DurationError::OutOfRange(self.to_string());

        match self.unit {
            DurationUnit::Day => TimeDelta::try_days(count)
                .and_then(|delta| date.checked_add_signed(delta))
                .ok_or_else(out_of_range),
            DurationUnit::Week => TimeDelta::try_weeks(count)
                .and_then(|delta| date.checked_add_signed(delta))
                .ok_or_else(out_of_range),
            DurationUnit::Month => add_months(date, count).ok_or_else(out_of_range),
            DurationUnit::Year => count
                .checked_mul(12)
                .and_then(|months| add_months(date, months))
                .ok_or_else(out_of_range),
        }
    }

    /// Resolve the expiry date for an item scanned at `reference`.
    ///
    /// The reference instant is reduced to its UTC calendar date before the
    /// duration is applied.
    ///
    /// # Errors
    ///
    /// Returns [`DurationError::OutOfRange`] if the result is not representable.
    pub fn expires_on(&self, reference: DateTime<Utc>) -> Result<NaiveDate, DurationError> {
        self.add_to(reference.date_naive())
    }
}

/// Calendar-aware month addition that clamps the day-of-month.
fn add_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

impl fmt::Display for DurationString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.count, self.unit.letter())
    }
}

impl FromStr for DurationString {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DurationString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DurationString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
