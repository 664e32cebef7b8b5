//! Complaint lifecycle: submission, status changes, deletion and reads.
//!
//! Every write goes through [`ComplaintService`], which validates the caller
//! and the input, performs one store operation, and then hands a
//! [`NotificationEvent`] to the configured [`EventSink`]. The sink never
//! influences the result of the write.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use compass_core::{ComplaintId, ComplaintStatus};

use super::notifications::{EventSink, NotificationEvent};
use super::validation::{ComplaintForm, ValidationErrors, validate_complaint};
use crate::db::{ComplaintRepository, RepositoryError};
use crate::models::{
    Complaint, ComplaintPage, ComplaintQuery, ComplaintStats, NewComplaint, Pagination, Principal,
    Submitter,
};

/// Window counted as "recent" in [`ComplaintStats`].
const RECENT_WINDOW_DAYS: i64 = 7;

/// Errors from complaint lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("admin access required")]
    Forbidden,

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("complaint not found")]
    NotFound,

    #[error("complaint store unavailable")]
    Unavailable,

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for LifecycleError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Unavailable(_) => Self::Unavailable,
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Repository(other),
        }
    }
}

/// Complaint lifecycle service.
pub struct ComplaintService<'a> {
    complaints: &'a dyn ComplaintRepository,
    events: &'a dyn EventSink,
}

impl<'a> ComplaintService<'a> {
    #[must_use]
    pub const fn new(complaints: &'a dyn ComplaintRepository, events: &'a dyn EventSink) -> Self {
        Self { complaints, events }
    }

    /// Validate and store a new complaint, then announce it.
    ///
    /// New complaints always start `Pending`, whoever submits them.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Validation` with every failing field, or
    /// `LifecycleError::Unavailable` if the store cannot be reached.
    pub async fn create(
        &self,
        form: &ComplaintForm,
        submitter: Option<&Principal>,
    ) -> Result<Complaint, LifecycleError> {
        let valid = validate_complaint(form).map_err(LifecycleError::Validation)?;

        self.complaints.ping().await.map_err(|e| {
            tracing::warn!(error = %e, "Complaint store unreachable");
            LifecycleError::Unavailable
        })?;

        let submitted_by = submitter.map_or(Submitter::Anonymous, |p| Submitter::User {
            id: p.user_id,
            email: p.email.clone(),
        });

        let complaint = self
            .complaints
            .insert(NewComplaint {
                title: valid.title,
                description: valid.description,
                category: valid.category,
                priority: valid.priority,
                status: ComplaintStatus::Pending,
                submitted_by,
                submitted_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            complaint_id = %complaint.id,
            category = %complaint.category,
            priority = %complaint.priority,
            "Complaint submitted"
        );
        self.events
            .emit(NotificationEvent::new_complaint(complaint.clone()));

        Ok(complaint)
    }

    /// Move a complaint to `requested`.
    ///
    /// An event is emitted only when the status actually changed, carrying
    /// the status read by the same atomic write.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Forbidden` for non-admin callers,
    /// `LifecycleError::InvalidStatus` for unknown statuses and
    /// `LifecycleError::NotFound` for unknown ids.
    pub async fn update_status(
        &self,
        id: ComplaintId,
        requested: &str,
        caller: &Principal,
    ) -> Result<Complaint, LifecycleError> {
        if !caller.is_admin() {
            return Err(LifecycleError::Forbidden);
        }

        let status: ComplaintStatus = requested
            .parse()
            .map_err(|_| LifecycleError::InvalidStatus(requested.to_owned()))?;

        let change = self
            .complaints
            .update_status(id, status, Utc::now())
            .await?
            .ok_or(LifecycleError::NotFound)?;

        if change.changed() {
            tracing::info!(
                complaint_id = %id,
                from = %change.previous,
                to = %status,
                by = %caller.email,
                "Complaint status changed"
            );
            self.events.emit(NotificationEvent::status_changed(
                change.complaint.clone(),
                change.previous,
            ));
        }

        Ok(change.complaint)
    }

    /// Permanently remove a complaint.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Forbidden` for non-admin callers and
    /// `LifecycleError::NotFound` for unknown ids.
    pub async fn delete(
        &self,
        id: ComplaintId,
        caller: &Principal,
    ) -> Result<ComplaintId, LifecycleError> {
        if !caller.is_admin() {
            return Err(LifecycleError::Forbidden);
        }

        if !self.complaints.delete(id).await? {
            return Err(LifecycleError::NotFound);
        }

        tracing::info!(complaint_id = %id, by = %caller.email, "Complaint deleted");
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `LifecycleError::NotFound` for unknown ids.
    pub async fn get(&self, id: ComplaintId) -> Result<Complaint, LifecycleError> {
        self.complaints
            .get(id)
            .await?
            .ok_or(LifecycleError::NotFound)
    }

    /// # Errors
    ///
    /// Returns `LifecycleError::Repository` if the store query fails.
    pub async fn list(&self, query: &ComplaintQuery) -> Result<ComplaintPage, LifecycleError> {
        let (complaints, total) = self.complaints.list(query).await?;
        Ok(ComplaintPage {
            complaints,
            pagination: Pagination::new(query.page, query.limit, total),
        })
    }

    /// Counts across all complaints, with submissions in the week before `now`
    /// counted as recent.
    ///
    /// # Errors
    ///
    /// Returns `LifecycleError::Repository` if the store query fails.
    pub async fn stats(&self, now: DateTime<Utc>) -> Result<ComplaintStats, LifecycleError> {
        Ok(self
            .complaints
            .stats(now - Duration::days(RECENT_WINDOW_DAYS))
            .await?)
    }
}
