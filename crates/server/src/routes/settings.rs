//! System settings (admin) and notification preference (per account) handlers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, json_body};
use crate::error::Result;
use crate::middleware::{RequireAdmin, RequireUser};
use crate::models::{NotificationPreferences, SystemSettingsView};
use crate::services::settings::{PreferencesUpdate, SystemSettingsUpdate};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TestEmailRequest {
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TestEmailSent {
    pub to: String,
}

/// `GET /admin/settings`
pub async fn show_system(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<ApiResponse<SystemSettingsView>>> {
    let system = state.settings().system().await?;
    Ok(ApiResponse::data(system.masked()))
}

/// `PUT /admin/settings`
pub async fn update_system(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    body: std::result::Result<Json<SystemSettingsUpdate>, JsonRejection>,
) -> Result<Json<ApiResponse<SystemSettingsView>>> {
    let update = json_body(body)?;
    let rotated = update.changes_password();
    let saved = state.settings().update_system(update).await?;

    tracing::info!(by = %admin.email, password_rotated = rotated, "Admin updated system settings");
    Ok(ApiResponse::with_message(
        saved.masked(),
        "Settings updated successfully",
    ))
}

/// `POST /admin/settings/test-email`
///
/// The body is optional; without `to` the message goes to the admin address.
pub async fn test_email(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    body: Option<Json<TestEmailRequest>>,
) -> Result<Json<ApiResponse<TestEmailSent>>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let to = state.settings().send_test_email(request.to.as_deref()).await?;
    Ok(ApiResponse::with_message(
        TestEmailSent { to },
        "Test email sent successfully",
    ))
}

/// `GET /user/settings`
pub async fn show_preferences(
    State(state): State<AppState>,
    RequireUser(principal): RequireUser,
) -> Result<Json<ApiResponse<NotificationPreferences>>> {
    let prefs = state.settings().preferences(&principal).await?;
    Ok(ApiResponse::data(prefs))
}

/// `PUT /user/settings`
pub async fn update_preferences(
    State(state): State<AppState>,
    RequireUser(principal): RequireUser,
    body: std::result::Result<Json<PreferencesUpdate>, JsonRejection>,
) -> Result<Json<ApiResponse<NotificationPreferences>>> {
    let update = json_body(body)?;
    let prefs = state
        .settings()
        .update_preferences(&principal, update)
        .await?;
    Ok(ApiResponse::with_message(
        prefs,
        "Notification preferences updated successfully",
    ))
}
