//! System settings and per-account notification preferences.

use chrono::Utc;
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use compass_core::Email;

use super::email::{EmailError, Mailer, OutgoingEmail};
use super::validation::ValidationErrors;
use crate::config::ServerConfig;
use crate::db::{RepositoryError, SettingsRepository};
use crate::models::{MASKED_SECRET, NotificationPreferences, Principal, SystemSettings};

/// Errors from settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings: {0}")]
    Validation(ValidationErrors),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Email(#[from] EmailError),
}

/// The stored system settings, or the startup defaults if none were saved.
///
/// # Errors
///
/// Returns the repository error if the settings cannot be read.
pub async fn effective_system_settings(
    repo: &dyn SettingsRepository,
    config: &ServerConfig,
) -> Result<SystemSettings, RepositoryError> {
    Ok(repo
        .system()
        .await?
        .unwrap_or_else(|| SystemSettings::from_config(config)))
}

/// Partial update of the system settings. Absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettingsUpdate {
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u32>,
    pub smtp_user: Option<String>,
    /// Empty or masked keeps the stored password.
    pub smtp_pass: Option<String>,
    pub admin_email: Option<String>,
    pub base_url: Option<String>,
    pub system_name: Option<String>,
}

/// Partial update of the caller's notification preferences.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    pub notification_email: Option<String>,
    pub receive_new_complaints: Option<bool>,
    pub receive_status_updates: Option<bool>,
}

/// Settings service.
pub struct SettingsService<'a> {
    settings: &'a dyn SettingsRepository,
    mailer: &'a dyn Mailer,
    config: &'a ServerConfig,
}

impl<'a> SettingsService<'a> {
    #[must_use]
    pub const fn new(
        settings: &'a dyn SettingsRepository,
        mailer: &'a dyn Mailer,
        config: &'a ServerConfig,
    ) -> Self {
        Self {
            settings,
            mailer,
            config,
        }
    }

    /// Current system settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Repository` if the settings cannot be read.
    pub async fn system(&self) -> Result<SystemSettings, SettingsError> {
        Ok(effective_system_settings(self.settings, self.config).await?)
    }

    /// Apply a partial update and store the result.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Validation` for malformed values.
    pub async fn update_system(
        &self,
        update: SystemSettingsUpdate,
    ) -> Result<SystemSettings, SettingsError> {
        let mut next = self.system().await?;
        let mut errors = ValidationErrors::default();

        if let Some(host) = update.smtp_host {
            let host = host.trim();
            if host.is_empty() {
                errors.push("smtpHost", "SMTP host is required");
            }
            host.clone_into(&mut next.smtp_host);
        }
        if let Some(port) = update.smtp_port {
            match u16::try_from(port) {
                Ok(port) if port > 0 => next.smtp_port = port,
                _ => errors.push("smtpPort", "SMTP port must be between 1 and 65535"),
            }
        }
        if let Some(user) = update.smtp_user {
            user.trim().clone_into(&mut next.smtp_user);
        }
        if let Some(pass) = update.smtp_pass
            && !pass.is_empty()
            && pass != MASKED_SECRET
        {
            next.smtp_pass = SecretString::from(pass);
        }
        if let Some(admin_email) = update.admin_email {
            let admin_email = admin_email.trim();
            if admin_email.is_empty() {
                next.admin_email = String::new();
            } else {
                match Email::parse(admin_email) {
                    Ok(email) => next.admin_email = email.into_inner(),
                    Err(_) => errors.push("adminEmail", "Invalid admin email address"),
                }
            }
        }
        if let Some(base_url) = update.base_url {
            let base_url = base_url.trim();
            match url::Url::parse(base_url) {
                Ok(_) => base_url.trim_end_matches('/').clone_into(&mut next.base_url),
                Err(_) => errors.push("baseUrl", "Invalid base URL"),
            }
        }
        if let Some(name) = update.system_name {
            let name = name.trim();
            if name.is_empty() {
                errors.push("systemName", "System name is required");
            }
            name.clone_into(&mut next.system_name);
        }

        if !errors.is_empty() {
            return Err(SettingsError::Validation(errors));
        }

        let saved = self.settings.save_system(&next, Utc::now()).await?;
        tracing::info!(
            smtp_host = %saved.smtp_host,
            configured = saved.is_configured(),
            "System settings updated"
        );
        Ok(saved)
    }

    /// The caller's notification preferences, defaults if never saved.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Repository` if the preferences cannot be read.
    pub async fn preferences(
        &self,
        principal: &Principal,
    ) -> Result<NotificationPreferences, SettingsError> {
        Ok(self
            .settings
            .preferences(principal.user_id)
            .await?
            .unwrap_or_default())
    }

    /// Apply a partial update to the caller's preferences.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Validation` if the notification email is malformed.
    pub async fn update_preferences(
        &self,
        principal: &Principal,
        update: PreferencesUpdate,
    ) -> Result<NotificationPreferences, SettingsError> {
        let mut next = self.preferences(principal).await?;

        if let Some(email) = update.notification_email {
            let email = email.trim();
            if email.is_empty() {
                next.notification_email = String::new();
            } else {
                let parsed = Email::parse(email).map_err(|_| {
                    let mut errors = ValidationErrors::default();
                    errors.push("notificationEmail", "Invalid notification email address");
                    SettingsError::Validation(errors)
                })?;
                next.notification_email = parsed.into_inner();
            }
        }
        if let Some(flag) = update.receive_new_complaints {
            next.receive_new_complaints = flag;
        }
        if let Some(flag) = update.receive_status_updates {
            next.receive_status_updates = flag;
        }

        Ok(self
            .settings
            .save_preferences(principal.user_id, &next, Utc::now())
            .await?)
    }

    /// Verify the SMTP connection and send the test message.
    ///
    /// Returns the address the message went to: `to` if given, otherwise the
    /// configured admin address.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::Email` when mail is not configured, the server is
    /// unreachable, or sending fails.
    pub async fn send_test_email(&self, to: Option<&str>) -> Result<String, SettingsError> {
        let system = self.system().await?;
        if !system.is_configured() {
            return Err(EmailError::NotConfigured.into());
        }

        let recipient = to
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(system.admin_email.as_str())
            .to_owned();

        self.mailer.verify(&system).await?;
        let email = OutgoingEmail::test(&recipient, &system, Utc::now())?;
        self.mailer.send(&system, email).await?;

        tracing::info!(to = %recipient, "Test email sent");
        Ok(recipient)
    }
}

impl SystemSettingsUpdate {
    /// Whether the update carries a new password.
    #[must_use]
    pub fn changes_password(&self) -> bool {
        self.smtp_pass
            .as_deref()
            .is_some_and(|p| !p.is_empty() && p != MASKED_SECRET)
    }
}
