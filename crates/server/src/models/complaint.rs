//! Complaint records and the query types used to list them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use compass_core::{Category, ComplaintId, ComplaintStatus, Email, Priority, UserId};

/// Who submitted a complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Submitter {
    /// Submitted without a session.
    Anonymous,
    /// Submitted by a signed-in principal.
    User { id: UserId, email: Email },
}

impl Submitter {
    /// The submitter's email, if known.
    #[must_use]
    pub const fn email(&self) -> Option<&Email> {
        match self {
            Self::Anonymous => None,
            Self::User { email, .. } => Some(email),
        }
    }
}

/// A stored complaint.
///
/// Only `status` (and with it `last_modified`) changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    pub id: ComplaintId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: ComplaintStatus,
    pub submitted_by: Submitter,
    pub date_submitted: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// A validated complaint ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComplaint {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
    pub status: ComplaintStatus,
    pub submitted_by: Submitter,
    pub submitted_at: DateTime<Utc>,
}

impl NewComplaint {
    /// Materialize the record under a fresh id.
    #[must_use]
    pub fn into_complaint(self, id: ComplaintId) -> Complaint {
        Complaint {
            id,
            title: self.title,
            description: self.description,
            category: self.category,
            priority: self.priority,
            status: self.status,
            submitted_by: self.submitted_by,
            date_submitted: self.submitted_at,
            last_modified: self.submitted_at,
        }
    }
}

/// Result of an atomic status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// The record after the write.
    pub complaint: Complaint,
    /// The status read immediately before the write.
    pub previous: ComplaintStatus,
}

impl StatusChange {
    /// Whether the write actually moved the complaint to a different status.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != self.complaint.status
    }
}

/// Column a complaint list can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    DateSubmitted,
    LastModified,
    Title,
    Priority,
    Status,
    Category,
}

impl SortField {
    /// Parse the `sortBy` query value.
    #[must_use]
    pub fn from_param(value: &str) -> Option<Self> {
        match value {
            "dateSubmitted" => Some(Self::DateSubmitted),
            "lastModified" => Some(Self::LastModified),
            "title" => Some(Self::Title),
            "priority" => Some(Self::Priority),
            "status" => Some(Self::Status),
            "category" => Some(Self::Category),
            _ => None,
        }
    }

    /// SQL column backing this field.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::DateSubmitted => "date_submitted",
            Self::LastModified => "last_modified",
            Self::Title => "title",
            Self::Priority => "priority",
            Self::Status => "status",
            Self::Category => "category",
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Equality filters plus a free-text search over title and description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplaintFilter {
    pub status: Option<ComplaintStatus>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub submitter_email: Option<Email>,
    pub search: Option<String>,
}

impl ComplaintFilter {
    /// Whether a complaint passes every set filter.
    #[must_use]
    pub fn matches(&self, complaint: &Complaint) -> bool {
        self.status.is_none_or(|s| s == complaint.status)
            && self.priority.is_none_or(|p| p == complaint.priority)
            && self.category.is_none_or(|c| c == complaint.category)
            && self
                .submitter_email
                .as_ref()
                .is_none_or(|email| complaint.submitted_by.email() == Some(email))
            && self.search.as_deref().is_none_or(|needle| {
                let needle = needle.to_lowercase();
                complaint.title.to_lowercase().contains(&needle)
                    || complaint.description.to_lowercase().contains(&needle)
            })
    }
}

/// A validated list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplaintQuery {
    pub filter: ComplaintFilter,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl ComplaintQuery {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 100;

    /// Rows to skip before this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

impl Default for ComplaintQuery {
    fn default() -> Self {
        Self {
            filter: ComplaintFilter::default(),
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Pagination block of a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl Pagination {
    #[must_use]
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        Self {
            page,
            limit,
            total,
            pages: total.div_ceil(u64::from(limit.max(1))),
        }
    }
}

/// One page of complaints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintPage {
    pub complaints: Vec<Complaint>,
    pub pagination: Pagination,
}

/// Aggregate counts over all complaints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintStats {
    pub total: u64,
    pub by_status: BTreeMap<ComplaintStatus, u64>,
    pub by_priority: BTreeMap<Priority, u64>,
    pub by_category: BTreeMap<Category, u64>,
    /// Complaints submitted within the last seven days.
    pub recent_complaints: u64,
}

impl Default for ComplaintStats {
    fn default() -> Self {
        Self {
            total: 0,
            by_status: ComplaintStatus::ALL.into_iter().map(|s| (s, 0)).collect(),
            by_priority: Priority::ALL.into_iter().map(|p| (p, 0)).collect(),
            by_category: Category::ALL.into_iter().map(|c| (c, 0)).collect(),
            recent_complaints: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample(title: &str, submitted_by: Submitter) -> Complaint {
        NewComplaint {
            title: title.to_owned(),
            description: "No internet for 2 days in room 4".to_owned(),
            category: Category::Service,
            priority: Priority::High,
            status: ComplaintStatus::Pending,
            submitted_by,
            submitted_at: Utc::now(),
        }
        .into_complaint(ComplaintId::generate())
    }

    #[test]
    fn test_submitter_serialization() {
        let anon = serde_json::to_value(Submitter::Anonymous).unwrap();
        assert_eq!(anon, serde_json::json!({ "type": "anonymous" }));

        let id = UserId::generate();
        let user = Submitter::User {
            id,
            email: Email::parse("guest@example.com").unwrap(),
        };
        let value = serde_json::to_value(user).unwrap();
        assert_eq!(value["type"], "user");
        assert_eq!(value["email"], "guest@example.com");
        assert_eq!(value["id"], id.to_string());
    }

    #[test]
    fn test_complaint_uses_camel_case() {
        let value = serde_json::to_value(sample("Wi-Fi down", Submitter::Anonymous)).unwrap();
        assert!(value.get("dateSubmitted").is_some());
        assert!(value.get("lastModified").is_some());
        assert_eq!(value["submittedBy"]["type"], "anonymous");
        assert_eq!(value["status"], "Pending");
    }

    #[test]
    fn test_new_complaint_timestamps_match() {
        let complaint = sample("Wi-Fi down", Submitter::Anonymous);
        assert_eq!(complaint.date_submitted, complaint.last_modified);
    }

    #[test]
    fn test_filter_matches() {
        let email = Email::parse("guest@example.com").unwrap();
        let complaint = sample(
            "Wi-Fi down",
            Submitter::User {
                id: UserId::generate(),
                email: email.clone(),
            },
        );

        assert!(ComplaintFilter::default().matches(&complaint));
        assert!(
            ComplaintFilter {
                submitter_email: Some(email),
                status: Some(ComplaintStatus::Pending),
                ..Default::default()
            }
            .matches(&complaint)
        );
        assert!(
            !ComplaintFilter {
                priority: Some(Priority::Low),
                ..Default::default()
            }
            .matches(&complaint)
        );
        assert!(
            ComplaintFilter {
                search: Some("ROOM 4".to_owned()),
                ..Default::default()
            }
            .matches(&complaint)
        );
    }

    #[test]
    fn test_pagination_rounds_up() {
        assert_eq!(Pagination::new(1, 50, 0).pages, 0);
        assert_eq!(Pagination::new(1, 50, 50).pages, 1);
        assert_eq!(Pagination::new(1, 50, 51).pages, 2);
    }

    #[test]
    fn test_query_offset() {
        let query = ComplaintQuery {
            page: 3,
            limit: 20,
            ..Default::default()
        };
        assert_eq!(query.offset(), 40);
        assert_eq!(ComplaintQuery::default().offset(), 0);
    }

    #[test]
    fn test_stats_default_lists_every_bucket() {
        let value = serde_json::to_value(ComplaintStats::default()).unwrap();
        assert_eq!(value["byStatus"]["In Progress"], 0);
        assert_eq!(value["byPriority"]["High"], 0);
        assert_eq!(value["byCategory"]["Support"], 0);
        assert_eq!(value["recentComplaints"], 0);
    }
}
