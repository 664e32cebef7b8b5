//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors render as the JSON
//! envelope `{"success": false, "error": "...", "details": ...}`; server-side
//! failures are captured to Sentry and never expose their details.

use axum::{
    Json,
    http::{HeaderName, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::middleware::RateLimited;
use crate::services::auth::AuthError;
use crate::services::complaints::LifecycleError;
use crate::services::email::EmailError;
use crate::services::settings::SettingsError;
use crate::services::validation::ValidationErrors;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Input failed field validation.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Malformed request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No valid session.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Too many submissions from one client.
    #[error("Rate limited")]
    RateLimited(RateLimited),

    /// The store cannot be reached.
    #[error("Service unavailable")]
    Unavailable,

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Complaint lifecycle operation failed.
    #[error("Complaint error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Settings operation failed.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RateLimited> for AppError {
    fn from(limited: RateLimited) -> Self {
        Self::RateLimited(limited)
    }
}

const GENERIC_INTERNAL: &str = "Internal server error";
const GENERIC_UNAVAILABLE: &str = "Service temporarily unavailable. Please try again later.";

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Auth(err) => match err {
                AuthError::MissingCredentials
                | AuthError::InvalidEmail(_)
                | AuthError::WeakPassword(_) => StatusCode::BAD_REQUEST,
                AuthError::InvalidCredentials | AuthError::Unauthenticated => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::Repository(e) => repository_status(e),
                AuthError::PasswordHash | AuthError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Lifecycle(err) => match err {
                LifecycleError::Validation(_) | LifecycleError::InvalidStatus(_) => {
                    StatusCode::BAD_REQUEST
                }
                LifecycleError::Forbidden => StatusCode::FORBIDDEN,
                LifecycleError::NotFound => StatusCode::NOT_FOUND,
                LifecycleError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                LifecycleError::Repository(e) => repository_status(e),
            },
            Self::Settings(err) => match err {
                SettingsError::Validation(_) | SettingsError::Email(EmailError::NotConfigured) => {
                    StatusCode::BAD_REQUEST
                }
                SettingsError::Email(_) => StatusCode::BAD_GATEWAY,
                SettingsError::Repository(e) => repository_status(e),
            },
            Self::Database(e) => repository_status(e),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message. Internal details never leave the server.
    fn message(&self) -> String {
        match self {
            Self::Validation(_) => "Validation failed".to_owned(),
            Self::BadRequest(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg) => msg.clone(),
            Self::RateLimited(_) => {
                "Too many complaints submitted from this IP, please try again later.".to_owned()
            }
            Self::Auth(err) => match err {
                AuthError::MissingCredentials => "Email and password are required".to_owned(),
                AuthError::InvalidEmail(_) => "Invalid email address".to_owned(),
                AuthError::InvalidCredentials => "Invalid email or password".to_owned(),
                AuthError::Unauthenticated => "Invalid token.".to_owned(),
                AuthError::UserAlreadyExists => "User already exists with this email".to_owned(),
                AuthError::WeakPassword(_) => "Password does not meet requirements".to_owned(),
                _ => self.fallback_message(),
            },
            Self::Lifecycle(err) => match err {
                LifecycleError::Validation(_) => "Validation failed".to_owned(),
                LifecycleError::InvalidStatus(_) => "Invalid status value".to_owned(),
                LifecycleError::Forbidden => "Access denied. Admin privileges required.".to_owned(),
                LifecycleError::NotFound => "Complaint not found".to_owned(),
                _ => self.fallback_message(),
            },
            Self::Settings(err) => match err {
                SettingsError::Validation(_) => "Validation failed".to_owned(),
                SettingsError::Email(EmailError::NotConfigured) => {
                    "Email is not configured. Set the SMTP user, password and admin email first."
                        .to_owned()
                }
                SettingsError::Email(e) => format!("Email test failed: {e}"),
                SettingsError::Repository(_) => self.fallback_message(),
            },
            Self::Unavailable | Self::Database(_) | Self::Internal(_) => self.fallback_message(),
        }
    }

    fn fallback_message(&self) -> String {
        if self.status() == StatusCode::SERVICE_UNAVAILABLE {
            GENERIC_UNAVAILABLE.to_owned()
        } else {
            GENERIC_INTERNAL.to_owned()
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Validation(errors)
            | Self::Lifecycle(LifecycleError::Validation(errors))
            | Self::Settings(SettingsError::Validation(errors)) => Some(json!(errors)),
            Self::Auth(AuthError::WeakPassword(problems)) => Some(json!(problems)),
            Self::Lifecycle(LifecycleError::InvalidStatus(given)) => Some(json!([{
                "field": "status",
                "message": format!("Status must be one of Pending, In Progress, Resolved (got '{given}')"),
            }])),
            _ => None,
        }
    }
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let mut body = json!({
            "success": false,
            "error": self.message(),
        });
        if let (Some(details), Some(object)) = (self.details(), body.as_object_mut()) {
            object.insert("details".to_owned(), details);
        }

        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited(limited) = &self {
            let headers = response.headers_mut();
            let retry_secs = limited.retry_after.as_secs()
                + u64::from(limited.retry_after.subsec_nanos() > 0);
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_secs.max(1)));
            headers.insert(
                HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(limited.limit),
            );
            headers.insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from_static("0"),
            );
        }

        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the current request.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}
