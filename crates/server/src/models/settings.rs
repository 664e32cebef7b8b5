//! System-wide mail settings and per-account notification preferences.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::{MailDefaults, ServerConfig};

/// Placeholder returned instead of the stored SMTP password.
pub const MASKED_SECRET: &str = "••••••••";

/// Mail transport and branding settings, one per deployment.
#[derive(Clone)]
pub struct SystemSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: SecretString,
    pub admin_email: String,
    pub base_url: String,
    pub system_name: String,
    pub last_updated: Option<DateTime<Utc>>,
}

impl SystemSettings {
    /// Settings derived from startup configuration, used until an
    /// administrator saves their own.
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let MailDefaults {
            smtp_host,
            smtp_port,
            smtp_user,
            smtp_pass,
            admin_email,
        } = config.mail.clone();

        Self {
            smtp_host,
            smtp_port,
            smtp_user,
            smtp_pass,
            admin_email,
            base_url: config.base_url.clone(),
            system_name: config.system_name.clone(),
            last_updated: None,
        }
    }

    /// Mail can be sent only with a user, a password and an admin address.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.smtp_user.trim().is_empty()
            && !self.smtp_pass.expose_secret().is_empty()
            && !self.admin_email.trim().is_empty()
    }

    /// View safe to return to clients.
    #[must_use]
    pub fn masked(&self) -> SystemSettingsView {
        SystemSettingsView {
            smtp_host: self.smtp_host.clone(),
            smtp_port: self.smtp_port,
            smtp_user: self.smtp_user.clone(),
            smtp_pass: if self.smtp_pass.expose_secret().is_empty() {
                String::new()
            } else {
                MASKED_SECRET.to_owned()
            },
            admin_email: self.admin_email.clone(),
            base_url: self.base_url.clone(),
            system_name: self.system_name.clone(),
            is_configured: self.is_configured(),
            last_updated: self.last_updated,
        }
    }
}

impl std::fmt::Debug for SystemSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemSettings")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_pass", &"[REDACTED]")
            .field("admin_email", &self.admin_email)
            .field("base_url", &self.base_url)
            .field("system_name", &self.system_name)
            .field("last_updated", &self.last_updated)
            .finish()
    }
}

/// Client-facing system settings with the password masked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettingsView {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: String,
    pub admin_email: String,
    pub base_url: String,
    pub system_name: String,
    pub is_configured: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Per-account notification switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    /// Address to notify instead of the account email; empty means unset.
    pub notification_email: String,
    pub receive_new_complaints: bool,
    pub receive_status_updates: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Default for NotificationPreferences {
    fn default() -> Self {
        Self {
            notification_email: String::new(),
            receive_new_complaints: true,
            receive_status_updates: true,
            last_updated: None,
        }
    }
}

impl NotificationPreferences {
    /// The configured override address, if any.
    #[must_use]
    pub fn override_email(&self) -> Option<&str> {
        Some(self.notification_email.trim()).filter(|e| !e.is_empty())
    }
}
