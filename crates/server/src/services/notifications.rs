//! Lifecycle notifications.
//!
//! Events are handed to [`NotificationDispatcher::emit`], which delivers them
//! on a detached task. Delivery is attempted once per recipient; every failure
//! is logged and dropped.

use std::collections::HashSet;
use std::sync::Arc;

use compass_core::{ComplaintStatus, UserId};

use super::email::{Mailer, OutgoingEmail};
use super::settings::effective_system_settings;
use crate::config::ServerConfig;
use crate::db::{RepositoryError, SettingsRepository, UserRepository};
use crate::models::{Complaint, NotificationPreferences, SystemSettings};

/// What happened to a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    NewComplaint,
    StatusChanged,
}

impl NotificationKind {
    const fn enabled_in(self, prefs: &NotificationPreferences) -> bool {
        match self {
            Self::NewComplaint => prefs.receive_new_complaints,
            Self::StatusChanged => prefs.receive_status_updates,
        }
    }
}

/// A lifecycle event with a snapshot of the complaint after the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub complaint: Complaint,
    /// Status before the change, for `StatusChanged`.
    pub previous_status: Option<ComplaintStatus>,
}

impl NotificationEvent {
    #[must_use]
    pub const fn new_complaint(complaint: Complaint) -> Self {
        Self {
            kind: NotificationKind::NewComplaint,
            complaint,
            previous_status: None,
        }
    }

    #[must_use]
    pub const fn status_changed(complaint: Complaint, previous: ComplaintStatus) -> Self {
        Self {
            kind: NotificationKind::StatusChanged,
            complaint,
            previous_status: Some(previous),
        }
    }
}

/// Receives lifecycle events. Implementations must not block the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: NotificationEvent);
}

/// Emails administrators about lifecycle events.
#[derive(Clone)]
pub struct NotificationDispatcher {
    users: Arc<dyn UserRepository>,
    settings: Arc<dyn SettingsRepository>,
    mailer: Arc<dyn Mailer>,
    config: Arc<ServerConfig>,
}

impl NotificationDispatcher {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserRepository>,
        settings: Arc<dyn SettingsRepository>,
        mailer: Arc<dyn Mailer>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            users,
            settings,
            mailer,
            config,
        }
    }

    /// Deliver one event and return how many messages were sent.
    ///
    /// Never fails: problems are logged and counted as undelivered.
    pub async fn deliver(&self, event: &NotificationEvent) -> usize {
        let system =
            match effective_system_settings(self.settings.as_ref(), &self.config).await {
                Ok(system) => system,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not load settings for notification");
                    return 0;
                }
            };

        if !system.is_configured() {
            tracing::debug!(kind = ?event.kind, "Email not configured; skipping notification");
            return 0;
        }

        let recipients = match self.recipients(event.kind, &system).await {
            Ok(recipients) => recipients,
            Err(e) => {
                tracing::warn!(error = %e, "Could not resolve notification recipients");
                return 0;
            }
        };

        let mut delivered = 0;
        for to in recipients {
            let email = match event.kind {
                NotificationKind::NewComplaint => {
                    OutgoingEmail::new_complaint(&to, &system, &event.complaint)
                }
                NotificationKind::StatusChanged => OutgoingEmail::status_changed(
                    &to,
                    &system,
                    &event.complaint,
                    event.previous_status.unwrap_or(event.complaint.status),
                ),
            };

            let result = match email {
                Ok(email) => self.mailer.send(&system, email).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    error = %e,
                    to = %to,
                    complaint_id = %event.complaint.id,
                    kind = ?event.kind,
                    "Notification delivery failed"
                ),
            }
        }

        delivered
    }

    /// The system admin address plus every opted-in administrator,
    /// de-duplicated case-insensitively in first-seen order.
    async fn recipients(
        &self,
        kind: NotificationKind,
        system: &SystemSettings,
    ) -> Result<Vec<String>, RepositoryError> {
        let mut candidates = vec![system.admin_email.trim().to_owned()];

        for admin in self.users.active_admins().await? {
            let prefs = self
                .settings
                .preferences(admin.id)
                .await?
                .unwrap_or_default();
            if kind.enabled_in(&prefs) {
                candidates.push(
                    prefs
                        .override_email()
                        .unwrap_or_else(|| admin.email.as_str())
                        .to_owned(),
                );
            }
        }

        // The demo administrator has no account email, so it is notified only
        // at an address it stored itself.
        if let Some(prefs) = self.settings.preferences(UserId::DEMO).await?
            && kind.enabled_in(&prefs)
            && let Some(email) = prefs.override_email()
        {
            candidates.push(email.to_owned());
        }

        let mut seen = HashSet::new();
        Ok(candidates
            .into_iter()
            .filter(|email| !email.is_empty() && seen.insert(email.to_lowercase()))
            .collect())
    }
}

impl EventSink for NotificationDispatcher {
    fn emit(&self, event: NotificationEvent) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let delivered = dispatcher.deliver(&event).await;
            tracing::debug!(
                complaint_id = %event.complaint.id,
                kind = ?event.kind,
                delivered,
                "Notification dispatch finished"
            );
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use secrecy::SecretString;

    use compass_core::{Category, ComplaintId, Email, Priority, Role};

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{NewComplaint, NewUser, Submitter};
    use crate::services::email::MemoryMailer;

    struct Fixture {
        store: Arc<MemoryStore>,
        mailer: Arc<MemoryMailer>,
        dispatcher: NotificationDispatcher,
    }

    fn fixture_with(mailer: MemoryMailer) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(mailer);
        let config = Arc::new(ServerConfig::in_memory(SecretString::from(
            "k3Jx9!vQ2mZp7#Lw4Rt8@Yh1Nc6$Bd0Fs5",
        )));
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            store.clone(),
            mailer.clone(),
            config,
        );
        Fixture {
            store,
            mailer,
            dispatcher,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MemoryMailer::new())
    }

    async fn configure_mail(store: &MemoryStore) {
        let settings = SystemSettings {
            smtp_host: "smtp.example.com".to_owned(),
            smtp_port: 587,
            smtp_user: "mailer@example.com".to_owned(),
            smtp_pass: SecretString::from("app-password"),
            admin_email: "ops@example.com".to_owned(),
            base_url: "http://localhost:3000".to_owned(),
            system_name: "Compass".to_owned(),
            last_updated: None,
        };
        store.save_system(&settings, Utc::now()).await.unwrap();
    }

    async fn add_admin(store: &MemoryStore, email: &str) -> UserId {
        store
            .create(NewUser {
                email: Email::parse(email).unwrap(),
                password_hash: "hash".to_owned(),
                role: Role::Admin,
            })
            .await
            .unwrap()
            .id
    }

    fn event() -> NotificationEvent {
        let complaint = NewComplaint {
            title: "Wi-Fi down".to_owned(),
            description: "No internet for 2 days in room 4".to_owned(),
            category: Category::Service,
            priority: Priority::High,
            status: ComplaintStatus::Pending,
            submitted_by: Submitter::Anonymous,
            submitted_at: Utc::now(),
        }
        .into_complaint(ComplaintId::generate());
        NotificationEvent::new_complaint(complaint)
    }

    #[tokio::test]
    async fn test_skips_when_not_configured() {
        let f = fixture();
        assert_eq!(f.dispatcher.deliver(&event()).await, 0);
        assert!(f.mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_recipients_deduplicated_and_filtered() {
        let f = fixture();
        configure_mail(&f.store).await;

        add_admin(&f.store, "OPS@example.com").await;
        let muted = add_admin(&f.store, "muted@example.com").await;
        let redirected = add_admin(&f.store, "lead@example.com").await;

        f.store
            .save_preferences(
                muted,
                &NotificationPreferences {
                    receive_new_complaints: false,
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        f.store
            .save_preferences(
                redirected,
                &NotificationPreferences {
                    notification_email: "pager@example.com".to_owned(),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(f.dispatcher.deliver(&event()).await, 2);
        let to: Vec<String> = f.mailer.sent().await.into_iter().map(|m| m.to).collect();
        assert_eq!(to, vec!["ops@example.com", "pager@example.com"]);
    }

    #[tokio::test]
    async fn test_demo_needs_stored_address() {
        let f = fixture();
        configure_mail(&f.store).await;

        f.store
            .save_preferences(UserId::DEMO, &NotificationPreferences::default(), Utc::now())
            .await
            .unwrap();
        assert_eq!(f.dispatcher.deliver(&event()).await, 1);

        f.store
            .save_preferences(
                UserId::DEMO,
                &NotificationPreferences {
                    notification_email: "demo@example.com".to_owned(),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(f.dispatcher.deliver(&event()).await, 2);
    }

    #[tokio::test]
    async fn test_delivery_failures_are_swallowed() {
        let f = fixture_with(MemoryMailer::failing());
        configure_mail(&f.store).await;
        assert_eq!(f.dispatcher.deliver(&event()).await, 0);
    }
}
