//! Core types for Best By Buddy.
//!
//! This module provides type-safe wrappers for the recognition domain.

pub mod duration;
pub mod envelope;
pub mod expiry;
pub mod id;
pub mod name;
pub mod status;

pub use duration::{DurationError, DurationString, DurationUnit};
pub use envelope::Envelope;
pub use expiry::{ExpiryRecord, ItemExpiry, PurchaseItems, RecognitionOutcome};
pub use id::*;
pub use name::{CanonicalName, NameError};
pub use status::StatusDesc;
