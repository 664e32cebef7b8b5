//! Settings database operations.
//!
//! Handles the single system settings row and per-account notification
//! preferences. Preferences are keyed by user id without a foreign key so the
//! demo administrator can hold a row too.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;

use compass_core::UserId;

use super::RepositoryError;
use crate::models::{NotificationPreferences, SystemSettings};

/// Storage operations on settings.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// The stored system settings, if an administrator ever saved them.
    async fn system(&self) -> Result<Option<SystemSettings>, RepositoryError>;

    /// Insert or replace the system settings. `last_updated` is set to `at`.
    async fn save_system(
        &self,
        settings: &SystemSettings,
        at: DateTime<Utc>,
    ) -> Result<SystemSettings, RepositoryError>;

    async fn preferences(
        &self,
        user: UserId,
    ) -> Result<Option<NotificationPreferences>, RepositoryError>;

    /// Insert or replace one account's preferences. `last_updated` is set to `at`.
    async fn save_preferences(
        &self,
        user: UserId,
        preferences: &NotificationPreferences,
        at: DateTime<Utc>,
    ) -> Result<NotificationPreferences, RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct SystemRow {
    smtp_host: String,
    smtp_port: i32,
    smtp_user: String,
    smtp_pass: String,
    admin_email: String,
    base_url: String,
    system_name: String,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SystemRow> for SystemSettings {
    type Error = RepositoryError;

    fn try_from(row: SystemRow) -> Result<Self, Self::Error> {
        let smtp_port = u16::try_from(row.smtp_port).map_err(|_| {
            RepositoryError::DataCorruption(format!("invalid smtp port: {}", row.smtp_port))
        })?;

        Ok(Self {
            smtp_host: row.smtp_host,
            smtp_port,
            smtp_user: row.smtp_user,
            smtp_pass: SecretString::from(row.smtp_pass),
            admin_email: row.admin_email,
            base_url: row.base_url,
            system_name: row.system_name,
            last_updated: Some(row.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct PreferencesRow {
    notification_email: String,
    receive_new_complaints: bool,
    receive_status_updates: bool,
    updated_at: DateTime<Utc>,
}

impl From<PreferencesRow> for NotificationPreferences {
    fn from(row: PreferencesRow) -> Self {
        Self {
            notification_email: row.notification_email,
            receive_new_complaints: row.receive_new_complaints,
            receive_status_updates: row.receive_status_updates,
            last_updated: Some(row.updated_at),
        }
    }
}

const SYSTEM_COLUMNS: &str =
    "smtp_host, smtp_port, smtp_user, smtp_pass, admin_email, base_url, system_name, updated_at";

const PREFERENCE_COLUMNS: &str =
    "notification_email, receive_new_complaints, receive_status_updates, updated_at";

/// `PostgreSQL` implementation of [`SettingsRepository`].
#[derive(Clone)]
pub struct PgSettingsRepository {
    pool: PgPool,
}

impl PgSettingsRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for PgSettingsRepository {
    async fn system(&self) -> Result<Option<SystemSettings>, RepositoryError> {
        sqlx::query_as::<_, SystemRow>(&format!(
            "SELECT {SYSTEM_COLUMNS} FROM system_settings WHERE id = 1"
        ))
        .fetch_optional(&self.pool)
        .await?
        .map(SystemSettings::try_from)
        .transpose()
    }

    async fn save_system(
        &self,
        settings: &SystemSettings,
        at: DateTime<Utc>,
    ) -> Result<SystemSettings, RepositoryError> {
        sqlx::query_as::<_, SystemRow>(&format!(
            "INSERT INTO system_settings (id, {SYSTEM_COLUMNS}) \
             VALUES (1, $1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO UPDATE SET \
                 smtp_host = EXCLUDED.smtp_host, \
                 smtp_port = EXCLUDED.smtp_port, \
                 smtp_user = EXCLUDED.smtp_user, \
                 smtp_pass = EXCLUDED.smtp_pass, \
                 admin_email = EXCLUDED.admin_email, \
                 base_url = EXCLUDED.base_url, \
                 system_name = EXCLUDED.system_name, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {SYSTEM_COLUMNS}"
        ))
        .bind(&settings.smtp_host)
        .bind(i32::from(settings.smtp_port))
        .bind(&settings.smtp_user)
        .bind(settings.smtp_pass.expose_secret())
        .bind(&settings.admin_email)
        .bind(&settings.base_url)
        .bind(&settings.system_name)
        .bind(at)
        .fetch_one(&self.pool)
        .await?
        .try_into()
    }

    async fn preferences(
        &self,
        user: UserId,
    ) -> Result<Option<NotificationPreferences>, RepositoryError> {
        let row = sqlx::query_as::<_, PreferencesRow>(&format!(
            "SELECT {PREFERENCE_COLUMNS} FROM notification_preferences WHERE user_id = $1"
        ))
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(NotificationPreferences::from))
    }

    async fn save_preferences(
        &self,
        user: UserId,
        preferences: &NotificationPreferences,
        at: DateTime<Utc>,
    ) -> Result<NotificationPreferences, RepositoryError> {
        let row = sqlx::query_as::<_, PreferencesRow>(&format!(
            "INSERT INTO notification_preferences (user_id, {PREFERENCE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 notification_email = EXCLUDED.notification_email, \
                 receive_new_complaints = EXCLUDED.receive_new_complaints, \
                 receive_status_updates = EXCLUDED.receive_status_updates, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {PREFERENCE_COLUMNS}"
        ))
        .bind(user)
        .bind(&preferences.notification_email)
        .bind(preferences.receive_new_complaints)
        .bind(preferences.receive_status_updates)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }
}
