//! Compass server library.
//!
//! Complaint intake and triage over a JSON HTTP API. Exposed as a library so
//! the binary, the CLI and the integration tests share one implementation.
//!
//! # Modules
//!
//! - [`config`] - Environment configuration
//! - [`db`] - Repositories (`PostgreSQL` and in-memory)
//! - [`models`] - Domain records
//! - [`services`] - Authentication, complaint lifecycle, notifications, settings
//! - [`middleware`] - Request ids, security headers, auth extractors, throttling
//! - [`routes`] - HTTP handlers and the router
//! - [`error`] - `AppError` and its JSON rendering

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::app;
pub use state::AppState;
