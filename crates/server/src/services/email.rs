//! Email composition and delivery.
//!
//! Messages are rendered from Askama templates (HTML plus plain text) and sent
//! over SMTP via lettre. The transport is rebuilt from the current
//! [`SystemSettings`] for every send, since administrators can change them at
//! runtime.

use std::time::Duration;

use askama::Template;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tokio::sync::Mutex;

use compass_core::ComplaintStatus;

use crate::models::{Complaint, SystemSettings};

/// SMTP connection and command timeout.
const SMTP_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Templates
// =============================================================================

#[derive(Template)]
#[template(path = "email/new_complaint.html")]
struct NewComplaintHtml<'a> {
    system_name: &'a str,
    base_url: &'a str,
    complaint: &'a Complaint,
    submitted: &'a str,
}

#[derive(Template)]
#[template(path = "email/new_complaint.txt")]
struct NewComplaintText<'a> {
    system_name: &'a str,
    base_url: &'a str,
    complaint: &'a Complaint,
    submitted: &'a str,
}

#[derive(Template)]
#[template(path = "email/status_changed.html")]
struct StatusChangedHtml<'a> {
    system_name: &'a str,
    base_url: &'a str,
    complaint: &'a Complaint,
    previous: ComplaintStatus,
    modified: &'a str,
}

#[derive(Template)]
#[template(path = "email/status_changed.txt")]
struct StatusChangedText<'a> {
    system_name: &'a str,
    base_url: &'a str,
    complaint: &'a Complaint,
    previous: ComplaintStatus,
    modified: &'a str,
}

#[derive(Template)]
#[template(path = "email/test.html")]
struct TestHtml<'a> {
    system_name: &'a str,
    sent_at: &'a str,
}

#[derive(Template)]
#[template(path = "email/test.txt")]
struct TestText<'a> {
    system_name: &'a str,
    sent_at: &'a str,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Errors that can occur when composing or sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP user, password or admin address is missing.
    #[error("email is not configured")]
    NotConfigured,

    /// The SMTP server did not accept a connection.
    #[error("could not connect to SMTP server {0}")]
    ConnectionFailed(String),

    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A rendered message ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl OutgoingEmail {
    /// Notification that a complaint was submitted.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Template` if rendering fails.
    pub fn new_complaint(
        to: &str,
        settings: &SystemSettings,
        complaint: &Complaint,
    ) -> Result<Self, EmailError> {
        let submitted = timestamp(complaint.date_submitted);
        let html = NewComplaintHtml {
            system_name: &settings.system_name,
            base_url: &settings.base_url,
            complaint,
            submitted: &submitted,
        }
        .render()?;
        let text = NewComplaintText {
            system_name: &settings.system_name,
            base_url: &settings.base_url,
            complaint,
            submitted: &submitted,
        }
        .render()?;

        Ok(Self {
            to: to.to_owned(),
            subject: format!("New Complaint Received - {}", complaint.title),
            text,
            html,
        })
    }

    /// Notification that a complaint moved from `previous` to its current status.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Template` if rendering fails.
    pub fn status_changed(
        to: &str,
        settings: &SystemSettings,
        complaint: &Complaint,
        previous: ComplaintStatus,
    ) -> Result<Self, EmailError> {
        let modified = timestamp(complaint.last_modified);
        let html = StatusChangedHtml {
            system_name: &settings.system_name,
            base_url: &settings.base_url,
            complaint,
            previous,
            modified: &modified,
        }
        .render()?;
        let text = StatusChangedText {
            system_name: &settings.system_name,
            base_url: &settings.base_url,
            complaint,
            previous,
            modified: &modified,
        }
        .render()?;

        Ok(Self {
            to: to.to_owned(),
            subject: format!("Complaint Status Updated - {}", complaint.title),
            text,
            html,
        })
    }

    /// Diagnostic message confirming the SMTP settings work.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Template` if rendering fails.
    pub fn test(
        to: &str,
        settings: &SystemSettings,
        sent_at: DateTime<Utc>,
    ) -> Result<Self, EmailError> {
        let sent_at = timestamp(sent_at);
        let html = TestHtml {
            system_name: &settings.system_name,
            sent_at: &sent_at,
        }
        .render()?;
        let text = TestText {
            system_name: &settings.system_name,
            sent_at: &sent_at,
        }
        .render()?;

        Ok(Self {
            to: to.to_owned(),
            subject: format!("Test Email - {}", settings.system_name),
            text,
            html,
        })
    }
}

// =============================================================================
// Transports
// =============================================================================

/// Delivers rendered email using the given settings.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one message.
    async fn send(&self, settings: &SystemSettings, email: OutgoingEmail)
    -> Result<(), EmailError>;

    /// Check that the SMTP server accepts a connection with these settings.
    async fn verify(&self, settings: &SystemSettings) -> Result<(), EmailError>;
}

/// SMTP delivery over STARTTLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpMailer;

impl SmtpMailer {
    fn transport(settings: &SystemSettings) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
        if !settings.is_configured() {
            return Err(EmailError::NotConfigured);
        }

        let credentials = Credentials::new(
            settings.smtp_user.clone(),
            settings.smtp_pass.expose_secret().to_owned(),
        );

        Ok(
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)?
                .port(settings.smtp_port)
                .credentials(credentials)
                .timeout(Some(SMTP_TIMEOUT))
                .build(),
        )
    }
}

/// The sender mailbox: `"<system name> Support" <smtp user>`, falling back to
/// the admin address when the SMTP user is not an email address.
fn sender(settings: &SystemSettings) -> Result<Mailbox, EmailError> {
    let address = settings
        .smtp_user
        .parse::<Address>()
        .or_else(|_| settings.admin_email.parse::<Address>())
        .map_err(|_| EmailError::InvalidAddress(settings.smtp_user.clone()))?;

    Ok(Mailbox::new(
        Some(format!("{} Support", settings.system_name)),
        address,
    ))
}

fn build_message(settings: &SystemSettings, email: OutgoingEmail) -> Result<Message, EmailError> {
    let to = email
        .to
        .parse::<Mailbox>()
        .map_err(|_| EmailError::InvalidAddress(email.to.clone()))?;

    Ok(Message::builder()
        .from(sender(settings)?)
        .to(to)
        .subject(email.subject)
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(email.text),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(email.html),
                ),
        )?)
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        settings: &SystemSettings,
        email: OutgoingEmail,
    ) -> Result<(), EmailError> {
        let transport = Self::transport(settings)?;
        let to = email.to.clone();
        let subject = email.subject.clone();
        let message = build_message(settings, email)?;

        transport.send(message).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }

    async fn verify(&self, settings: &SystemSettings) -> Result<(), EmailError> {
        let transport = Self::transport(settings)?;
        if transport.test_connection().await? {
            Ok(())
        } else {
            Err(EmailError::ConnectionFailed(settings.smtp_host.clone()))
        }
    }
}

/// Records messages instead of sending them. Used by tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl MemoryMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send and verify fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    /// Everything sent so far.
    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(
        &self,
        settings: &SystemSettings,
        email: OutgoingEmail,
    ) -> Result<(), EmailError> {
        if !settings.is_configured() {
            return Err(EmailError::NotConfigured);
        }
        if self.fail {
            return Err(EmailError::ConnectionFailed(settings.smtp_host.clone()));
        }
        self.sent.lock().await.push(email);
        Ok(())
    }

    async fn verify(&self, settings: &SystemSettings) -> Result<(), EmailError> {
        if !settings.is_configured() {
            return Err(EmailError::NotConfigured);
        }
        if self.fail {
            return Err(EmailError::ConnectionFailed(settings.smtp_host.clone()));
        }
        Ok(())
    }
}
