//! In-process store used when no database is configured, and by tests.
//!
//! Every operation takes the relevant lock once, so each call is atomic with
//! respect to the others in the same way a single SQL statement is.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use compass_core::{ComplaintId, ComplaintStatus, Email, Role, UserId};

use super::{ComplaintRepository, RepositoryError, SettingsRepository, UserRepository};
use crate::models::{
    Complaint, ComplaintQuery, ComplaintStats, NewComplaint, NewUser, NotificationPreferences,
    SortField, SortOrder, StatusChange, SystemSettings, User,
};

struct StoredUser {
    user: User,
    password_hash: String,
}

/// All repositories over process memory.
#[derive(Default)]
pub struct MemoryStore {
    complaints: RwLock<HashMap<ComplaintId, Complaint>>,
    users: RwLock<HashMap<UserId, StoredUser>>,
    system: RwLock<Option<SystemSettings>>,
    preferences: RwLock<HashMap<UserId, NotificationPreferences>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn compare(a: &Complaint, b: &Complaint, field: SortField) -> Ordering {
    match field {
        SortField::DateSubmitted => a.date_submitted.cmp(&b.date_submitted),
        SortField::LastModified => a.last_modified.cmp(&b.last_modified),
        SortField::Title => a.title.cmp(&b.title),
        SortField::Priority => a.priority.cmp(&b.priority),
        SortField::Status => a.status.cmp(&b.status),
        SortField::Category => a.category.cmp(&b.category),
    }
    .then_with(|| a.id.cmp(&b.id))
}

fn as_count(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

// =============================================================================
// Complaints
// =============================================================================

#[async_trait]
impl ComplaintRepository for MemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn insert(&self, complaint: NewComplaint) -> Result<Complaint, RepositoryError> {
        let complaint = complaint.into_complaint(ComplaintId::generate());
        self.complaints
            .write()
            .await
            .insert(complaint.id, complaint.clone());
        Ok(complaint)
    }

    async fn get(&self, id: ComplaintId) -> Result<Option<Complaint>, RepositoryError> {
        Ok(self.complaints.read().await.get(&id).cloned())
    }

    async fn list(
        &self,
        query: &ComplaintQuery,
    ) -> Result<(Vec<Complaint>, u64), RepositoryError> {
        let complaints = self.complaints.read().await;
        let mut matching: Vec<&Complaint> = complaints
            .values()
            .filter(|c| query.filter.matches(c))
            .collect();

        matching.sort_by(|a, b| {
            let ordering = compare(a, b, query.sort_by);
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let total = as_count(matching.len());
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        let page = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn update_status(
        &self,
        id: ComplaintId,
        status: ComplaintStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusChange>, RepositoryError> {
        let mut complaints = self.complaints.write().await;
        let Some(complaint) = complaints.get_mut(&id) else {
            return Ok(None);
        };

        let previous = std::mem::replace(&mut complaint.status, status);
        complaint.last_modified = at;

        Ok(Some(StatusChange {
            complaint: complaint.clone(),
            previous,
        }))
    }

    async fn delete(&self, id: ComplaintId) -> Result<bool, RepositoryError> {
        Ok(self.complaints.write().await.remove(&id).is_some())
    }

    async fn stats(&self, recent_since: DateTime<Utc>) -> Result<ComplaintStats, RepositoryError> {
        let complaints = self.complaints.read().await;
        let mut stats = ComplaintStats::default();

        for complaint in complaints.values() {
            stats.total += 1;
            *stats.by_status.entry(complaint.status).or_default() += 1;
            *stats.by_priority.entry(complaint.priority).or_default() += 1;
            *stats.by_category.entry(complaint.category).or_default() += 1;
            if complaint.date_submitted >= recent_since {
                stats.recent_complaints += 1;
            }
        }

        Ok(stats)
    }

    async fn clear(&self) -> Result<u64, RepositoryError> {
        let mut complaints = self.complaints.write().await;
        let removed = as_count(complaints.len());
        complaints.clear();
        Ok(removed)
    }
}

// =============================================================================
// Users
// =============================================================================

#[async_trait]
impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.read().await.get(&id).map(|s| s.user.clone()))
    }

    async fn find_credentials(
        &self,
        email: &Email,
    ) -> Result<Option<(User, String)>, RepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|s| &s.user.email == email)
            .map(|s| (s.user.clone(), s.password_hash.clone())))
    }

    async fn create(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        if users.values().any(|s| s.user.email == user.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }

        let now = Utc::now();
        let stored = StoredUser {
            user: User {
                id: UserId::generate(),
                email: user.email,
                role: user.role,
                is_active: true,
                last_login: None,
                created_at: now,
                updated_at: now,
            },
            password_hash: user.password_hash,
        };
        let created = stored.user.clone();
        users.insert(created.id, stored);
        Ok(created)
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        if let Some(stored) = self.users.write().await.get_mut(&id) {
            stored.user.last_login = Some(at);
            stored.user.updated_at = at;
        }
        Ok(())
    }

    async fn set_active(&self, email: &Email, active: bool) -> Result<User, RepositoryError> {
        let mut users = self.users.write().await;
        let stored = users
            .values_mut()
            .find(|s| &s.user.email == email)
            .ok_or(RepositoryError::NotFound)?;
        stored.user.is_active = active;
        stored.user.updated_at = Utc::now();
        Ok(stored.user.clone())
    }

    async fn count_admins(&self) -> Result<u64, RepositoryError> {
        let users = self.users.read().await;
        Ok(as_count(
            users.values().filter(|s| s.user.role == Role::Admin).count(),
        ))
    }

    async fn active_admins(&self) -> Result<Vec<User>, RepositoryError> {
        let users = self.users.read().await;
        let mut admins: Vec<User> = users
            .values()
            .filter(|s| s.user.role == Role::Admin && s.user.is_active)
            .map(|s| s.user.clone())
            .collect();
        admins.sort_by_key(|u| u.created_at);
        Ok(admins)
    }
}

// =============================================================================
// Settings
// =============================================================================

#[async_trait]
impl SettingsRepository for MemoryStore {
    async fn system(&self) -> Result<Option<SystemSettings>, RepositoryError> {
        Ok(self.system.read().await.clone())
    }

    async fn save_system(
        &self,
        settings: &SystemSettings,
        at: DateTime<Utc>,
    ) -> Result<SystemSettings, RepositoryError> {
        let saved = SystemSettings {
            last_updated: Some(at),
            ..settings.clone()
        };
        *self.system.write().await = Some(saved.clone());
        Ok(saved)
    }

    async fn preferences(
        &self,
        user: UserId,
    ) -> Result<Option<NotificationPreferences>, RepositoryError> {
        Ok(self.preferences.read().await.get(&user).cloned())
    }

    async fn save_preferences(
        &self,
        user: UserId,
        preferences: &NotificationPreferences,
        at: DateTime<Utc>,
    ) -> Result<NotificationPreferences, RepositoryError> {
        let saved = NotificationPreferences {
            last_updated: Some(at),
            ..preferences.clone()
        };
        self.preferences.write().await.insert(user, saved.clone());
        Ok(saved)
    }
}
