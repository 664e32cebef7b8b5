//! Input sanitization and validation for complaint submissions and list queries.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use compass_core::{Category, ComplaintStatus, Email, Priority};

use crate::models::{ComplaintFilter, ComplaintQuery, SortField, SortOrder};

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 1000;
pub const MAX_SEARCH_CHARS: usize = 100;

static SCRIPT_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("Invalid regex"));

/// A problem with one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field problem found in one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError {
            field,
            message: message.into(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        self.0.iter().map(|e| e.field).collect()
    }

    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<&str> = self.0.iter().map(|e| e.message.as_str()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

/// Trim and strip `<script>` blocks.
#[must_use]
pub fn sanitize(input: &str) -> String {
    SCRIPT_BLOCK_RE.replace_all(input.trim(), "").trim().to_owned()
}

/// Raw complaint submission body. Everything is optional so missing fields
/// surface as field errors rather than a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComplaintForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
}

/// A complaint submission that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidComplaint {
    pub title: String,
    pub description: String,
    pub category: Category,
    pub priority: Priority,
}

/// Sanitize and validate a submission, collecting every field error.
///
/// # Errors
///
/// Returns the field errors when any field is missing or invalid.
pub fn validate_complaint(form: &ComplaintForm) -> Result<ValidComplaint, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let title = form.title.as_deref().map(sanitize).unwrap_or_default();
    if title.is_empty() {
        errors.push("title", "Title is required");
    } else if title.chars().count() > MAX_TITLE_CHARS {
        errors.push(
            "title",
            format!("Title cannot exceed {MAX_TITLE_CHARS} characters"),
        );
    }

    let description = form
        .description
        .as_deref()
        .map(sanitize)
        .unwrap_or_default();
    if description.is_empty() {
        errors.push("description", "Description is required");
    } else if description.chars().count() > MAX_DESCRIPTION_CHARS {
        errors.push(
            "description",
            format!("Description cannot exceed {MAX_DESCRIPTION_CHARS} characters"),
        );
    }

    let category = match form.category.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push("category", "Category is required");
            None
        }
        Some(raw) => raw
            .parse::<Category>()
            .map_err(|_| errors.push("category", "Invalid category selected"))
            .ok(),
    };

    let priority = match form.priority.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push("priority", "Priority is required");
            None
        }
        Some(raw) => raw
            .parse::<Priority>()
            .map_err(|_| errors.push("priority", "Invalid priority selected"))
            .ok(),
    };

    match (category, priority) {
        (Some(category), Some(priority)) if errors.is_empty() => Ok(ValidComplaint {
            title,
            description,
            category,
            priority,
        }),
        _ => Err(errors),
    }
}

/// Raw list query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub user_email: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Turn list query parameters into a [`ComplaintQuery`].
///
/// `limit` above the maximum is clamped rather than rejected.
///
/// # Errors
///
/// Returns field errors for unknown enum values, malformed numbers, and an
/// over-long search term.
pub fn parse_list_params(params: &ListParams) -> Result<ComplaintQuery, ValidationErrors> {
    let mut errors = ValidationErrors::default();
    let mut query = ComplaintQuery::default();
    let mut filter = ComplaintFilter::default();

    if let Some(raw) = non_empty(params.status.as_ref()) {
        match raw.parse::<ComplaintStatus>() {
            Ok(status) => filter.status = Some(status),
            Err(_) => errors.push("status", "Invalid status"),
        }
    }
    if let Some(raw) = non_empty(params.priority.as_ref()) {
        match raw.parse::<Priority>() {
            Ok(priority) => filter.priority = Some(priority),
            Err(_) => errors.push("priority", "Invalid priority"),
        }
    }
    if let Some(raw) = non_empty(params.category.as_ref()) {
        match raw.parse::<Category>() {
            Ok(category) => filter.category = Some(category),
            Err(_) => errors.push("category", "Invalid category"),
        }
    }
    if let Some(raw) = non_empty(params.user_email.as_ref()) {
        match Email::parse(raw) {
            Ok(email) => filter.submitter_email = Some(email),
            Err(_) => errors.push("userEmail", "Invalid email address"),
        }
    }
    if let Some(raw) = non_empty(params.search.as_ref()) {
        if raw.chars().count() > MAX_SEARCH_CHARS {
            errors.push(
                "search",
                format!("Search cannot exceed {MAX_SEARCH_CHARS} characters"),
            );
        } else {
            filter.search = Some(raw.to_owned());
        }
    }

    if let Some(raw) = non_empty(params.page.as_ref()) {
        match raw.parse::<u32>() {
            Ok(page) if page >= 1 => query.page = page,
            _ => errors.push("page", "Page must be a positive integer"),
        }
    }
    if let Some(raw) = non_empty(params.limit.as_ref()) {
        match raw.parse::<u32>() {
            Ok(limit) if limit >= 1 => query.limit = limit.min(ComplaintQuery::MAX_LIMIT),
            _ => errors.push("limit", "Limit must be a positive integer"),
        }
    }
    if let Some(raw) = non_empty(params.sort_by.as_ref()) {
        match SortField::from_param(raw) {
            Some(field) => query.sort_by = field,
            None => errors.push("sortBy", "Invalid sort field"),
        }
    }
    if let Some(raw) = non_empty(params.sort_order.as_ref()) {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => query.sort_order = SortOrder::Asc,
            "desc" => query.sort_order = SortOrder::Desc,
            _ => errors.push("sortOrder", "Sort order must be 'asc' or 'desc'"),
        }
    }

    query.filter = filter;
    errors.into_result(query)
}
