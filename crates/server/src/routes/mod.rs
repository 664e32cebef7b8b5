//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                       - Liveness
//! GET    /health/ready                 - Readiness (store ping)
//!
//! # Complaints
//! POST   /complaints                   - Submit (rate limited)
//! GET    /complaints                   - Filtered, sorted, paginated list
//! GET    /complaints/stats             - Aggregate counts
//! GET    /complaints/{id}              - One complaint
//! PATCH  /complaints/{id}              - Change status (admin)
//! DELETE /complaints/{id}              - Delete (admin)
//!
//! # Auth
//! POST   /auth/login                   - Password or demo login
//! POST   /auth/register                - Create an account
//! POST   /auth/logout                  - Clear the session cookie
//! GET    /auth/me                      - Current principal
//!
//! # Settings
//! GET    /admin/settings               - System settings, secrets masked (admin)
//! PUT    /admin/settings               - Update system settings (admin)
//! POST   /admin/settings/test-email    - Send a test message (admin)
//! GET    /user/settings                - Caller's notification preferences
//! PUT    /user/settings                - Update caller's preferences
//! ```

pub mod auth;
pub mod complaints;
pub mod health;
pub mod settings;

use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Request, rejection::JsonRejection},
    middleware,
    response::Response,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{Span, field};

use crate::error::AppError;
use crate::middleware::{request_id_middleware, security_headers_middleware};
use crate::state::AppState;

// =============================================================================
// Response Envelope
// =============================================================================

/// Success envelope: `{"success": true, "data"?, "message"?}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    #[must_use]
    pub const fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }

    #[must_use]
    pub fn with_message(data: T, message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.to_owned()),
        })
    }
}

impl ApiResponse<()> {
    #[must_use]
    pub fn message(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            data: None,
            message: Some(message.to_owned()),
        })
    }
}

/// Unwrap a JSON body, turning extractor rejections into the error envelope.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

// =============================================================================
// Routers
// =============================================================================

fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(health::live))
        .route("/ready", get(health::ready))
}

fn complaint_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(complaints::list).post(complaints::create))
        .route("/stats", get(complaints::stats))
        .route(
            "/{id}",
            get(complaints::show)
                .patch(complaints::update_status)
                .delete(complaints::delete),
        )
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

fn admin_settings_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(settings::show_system).put(settings::update_system))
        .route("/test-email", post(settings::test_email))
}

/// All routes, without state or middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/health", health_routes())
        .nest("/complaints", complaint_routes())
        .nest("/auth", auth_routes())
        .nest("/admin/settings", admin_settings_routes())
        .route(
            "/user/settings",
            get(settings::show_preferences).put(settings::update_preferences),
        )
}

fn make_span(request: &Request) -> Span {
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = field::Empty,
        status = field::Empty,
        latency_ms = field::Empty,
    )
}

fn on_response(response: &Response, latency: Duration, span: &Span) {
    span.record("status", response.status().as_u16());
    span.record(
        "latency_ms",
        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
    );
    tracing::debug!("response sent");
}

/// The complete application: routes, state and the middleware stack.
pub fn app(state: AppState) -> Router {
    routes()
        .with_state(state)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(make_span)
                .on_response(on_response),
        )
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
