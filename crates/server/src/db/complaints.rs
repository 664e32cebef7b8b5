//! Complaint repository.
//!
//! Queries are built at runtime with `sqlx::query_as` and `QueryBuilder` so the
//! workspace compiles without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use compass_core::{Category, ComplaintId, ComplaintStatus, Email, Priority, UserId};

use super::RepositoryError;
use crate::models::{
    Complaint, ComplaintFilter, ComplaintQuery, ComplaintStats, NewComplaint, StatusChange,
    Submitter,
};

/// Storage operations on complaints.
#[async_trait]
pub trait ComplaintRepository: Send + Sync {
    /// Cheap liveness probe of the underlying store.
    async fn ping(&self) -> Result<(), RepositoryError>;

    /// Persist a new complaint under a freshly generated id.
    async fn insert(&self, complaint: NewComplaint) -> Result<Complaint, RepositoryError>;

    async fn get(&self, id: ComplaintId) -> Result<Option<Complaint>, RepositoryError>;

    /// One page of matching complaints plus the total number of matches.
    async fn list(&self, query: &ComplaintQuery)
    -> Result<(Vec<Complaint>, u64), RepositoryError>;

    /// Set the status and `last_modified` in one atomic step.
    ///
    /// Returns the updated record with the status it had immediately before
    /// the write, or `None` if no complaint has this id.
    async fn update_status(
        &self,
        id: ComplaintId,
        status: ComplaintStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusChange>, RepositoryError>;

    /// Hard delete. Returns whether a record was removed.
    async fn delete(&self, id: ComplaintId) -> Result<bool, RepositoryError>;

    /// Counts by status, priority and category, plus submissions since `recent_since`.
    async fn stats(&self, recent_since: DateTime<Utc>) -> Result<ComplaintStats, RepositoryError>;

    /// Remove every complaint. Returns how many were removed.
    async fn clear(&self) -> Result<u64, RepositoryError>;
}

const COLUMNS: &str = "id, title, description, category, priority, status, \
                       submitter_id, submitter_email, date_submitted, last_modified";

#[derive(sqlx::FromRow)]
struct ComplaintRow {
    id: ComplaintId,
    title: String,
    description: String,
    category: Category,
    priority: Priority,
    status: ComplaintStatus,
    submitter_id: Option<UserId>,
    submitter_email: Option<String>,
    date_submitted: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct StatusChangeRow {
    #[sqlx(flatten)]
    complaint: ComplaintRow,
    previous_status: ComplaintStatus,
}

impl TryFrom<ComplaintRow> for Complaint {
    type Error = RepositoryError;

    fn try_from(row: ComplaintRow) -> Result<Self, Self::Error> {
        let submitted_by = match (row.submitter_id, row.submitter_email) {
            (None, None) => Submitter::Anonymous,
            (Some(id), Some(email)) => Submitter::User {
                id,
                email: Email::parse(&email).map_err(|e| {
                    RepositoryError::DataCorruption(format!("invalid submitter email: {e}"))
                })?,
            },
            _ => {
                return Err(RepositoryError::DataCorruption(format!(
                    "complaint {} has a partial submitter",
                    row.id
                )));
            }
        };

        Ok(Self {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category,
            priority: row.priority,
            status: row.status,
            submitted_by,
            date_submitted: row.date_submitted,
            last_modified: row.last_modified,
        })
    }
}

fn submitter_columns(submitter: &Submitter) -> (Option<UserId>, Option<&str>) {
    match submitter {
        Submitter::Anonymous => (None, None),
        Submitter::User { id, email } => (Some(*id), Some(email.as_str())),
    }
}

/// Escape `LIKE` metacharacters so user input only matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a ComplaintFilter) {
    qb.push(" WHERE TRUE");
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority);
    }
    if let Some(category) = filter.category {
        qb.push(" AND category = ").push_bind(category);
    }
    if let Some(email) = &filter.submitter_email {
        qb.push(" AND submitter_email = ").push_bind(email.as_str());
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn count_to_u64(count: i64) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

/// `PostgreSQL` implementation of [`ComplaintRepository`].
#[derive(Clone)]
pub struct PgComplaintRepository {
    pool: PgPool,
}

impl PgComplaintRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ComplaintRepository for PgComplaintRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert(&self, complaint: NewComplaint) -> Result<Complaint, RepositoryError> {
        let (submitter_id, submitter_email) = submitter_columns(&complaint.submitted_by);

        let row = sqlx::query_as::<_, ComplaintRow>(&format!(
            "INSERT INTO complaints ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             RETURNING {COLUMNS}"
        ))
        .bind(ComplaintId::generate())
        .bind(&complaint.title)
        .bind(&complaint.description)
        .bind(complaint.category)
        .bind(complaint.priority)
        .bind(complaint.status)
        .bind(submitter_id)
        .bind(submitter_email)
        .bind(complaint.submitted_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get(&self, id: ComplaintId) -> Result<Option<Complaint>, RepositoryError> {
        sqlx::query_as::<_, ComplaintRow>(&format!(
            "SELECT {COLUMNS} FROM complaints WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Complaint::try_from)
        .transpose()
    }

    async fn list(
        &self,
        query: &ComplaintQuery,
    ) -> Result<(Vec<Complaint>, u64), RepositoryError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM complaints");
        push_filters(&mut count_qb, &query.filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM complaints"));
        push_filters(&mut qb, &query.filter);
        let direction = query.sort_order.keyword();
        qb.push(format!(
            " ORDER BY {} {direction}, id {direction}",
            query.sort_by.column()
        ));
        qb.push(" LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));

        let complaints = qb
            .build_query_as::<ComplaintRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Complaint::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((complaints, count_to_u64(total)))
    }

    async fn update_status(
        &self,
        id: ComplaintId,
        status: ComplaintStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusChange>, RepositoryError> {
        // The subquery locks the row, so the status it reads is the one this
        // UPDATE replaces.
        let row = sqlx::query_as::<_, StatusChangeRow>(
            r"
            UPDATE complaints AS c
            SET status = $2, last_modified = $3
            FROM (
                SELECT id, status AS previous_status
                FROM complaints
                WHERE id = $1
                FOR UPDATE
            ) AS old
            WHERE c.id = old.id
            RETURNING c.id, c.title, c.description, c.category, c.priority, c.status,
                      c.submitter_id, c.submitter_email, c.date_submitted, c.last_modified,
                      old.previous_status
            ",
        )
        .bind(id)
        .bind(status)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(StatusChange {
                complaint: r.complaint.try_into()?,
                previous: r.previous_status,
            })
        })
        .transpose()
    }

    async fn delete(&self, id: ComplaintId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM complaints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self, recent_since: DateTime<Utc>) -> Result<ComplaintStats, RepositoryError> {
        let (total, recent): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE date_submitted >= $1) FROM complaints",
        )
        .bind(recent_since)
        .fetch_one(&self.pool)
        .await?;

        let by_status: Vec<(ComplaintStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM complaints GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        let by_priority: Vec<(Priority, i64)> =
            sqlx::query_as("SELECT priority, COUNT(*) FROM complaints GROUP BY priority")
                .fetch_all(&self.pool)
                .await?;
        let by_category: Vec<(Category, i64)> =
            sqlx::query_as("SELECT category, COUNT(*) FROM complaints GROUP BY category")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = ComplaintStats {
            total: count_to_u64(total),
            recent_complaints: count_to_u64(recent),
            ..ComplaintStats::default()
        };
        for (status, count) in by_status {
            stats.by_status.insert(status, count_to_u64(count));
        }
        for (priority, count) in by_priority {
            stats.by_priority.insert(priority, count_to_u64(count));
        }
        for (category, count) in by_category {
            stats.by_category.insert(category, count_to_u64(count));
        }
        Ok(stats)
    }

    async fn clear(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM complaints")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
