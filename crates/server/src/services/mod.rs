//! Business logic between the HTTP routes and the repositories.
//!
//! - [`auth`] - Login, registration and session tokens
//! - [`complaints`] - Complaint lifecycle
//! - [`email`] - Message rendering and SMTP transport
//! - [`notifications`] - Fire-and-forget delivery of lifecycle events
//! - [`settings`] - System settings and notification preferences
//! - [`validation`] - Input sanitization and field validation

pub mod auth;
pub mod complaints;
pub mod email;
pub mod notifications;
pub mod settings;
pub mod validation;
