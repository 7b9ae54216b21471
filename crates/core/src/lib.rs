//! Best By Buddy Core - Shared domain types library.
//!
//! This crate provides the types used by every Best By Buddy component:
//! - `recognition` - Private core service (item recognition, expiry resolution, purchases)
//! - `gateway` - Public-facing gateway that authenticates end users
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. Duration parsing and expiry date arithmetic live
//! here so both binaries and the CLI agree on them.
//!
//! # Modules
//!
//! - [`types`] - Opaque UIDs, canonical names, duration strings, expiry records,
//!   status descriptions and the response envelope

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
