//! Compass Core - Shared domain types.
//!
//! Used by every Compass component:
//! - `server` - HTTP API for complaint submission and triage
//! - `cli` - Migrations, account administration and seeding
//!
//! # Architecture
//!
//! Only types live here. No I/O, no database access, no HTTP. The optional
//! `postgres` feature adds `sqlx` encode/decode support for the types that are
//! stored directly in columns.
//!
//! # Modules
//!
//! - [`types`] - Typed ids, normalized email addresses and the complaint enums

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
