//! HTTP middleware and request extractors.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transaction)
//! 2. `TraceLayer` (`http_request` span)
//! 3. Request ID (records into the span, echoes `x-request-id`)
//! 4. Security headers
//!
//! Authentication and submission throttling are extractors used by the
//! handlers that need them, not layers.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::{MaybePrincipal, RequireAdmin, RequireUser, SESSION_COOKIE, session_token};
pub use rate_limit::{ClientKey, RateLimited, SubmissionLimiter};
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};
pub use security_headers::security_headers_middleware;
