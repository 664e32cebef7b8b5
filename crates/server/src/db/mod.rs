//! Persistence for complaints, accounts and settings.
//!
//! Each aggregate has a repository trait with two implementations:
//!
//! - `Pg*Repository` - `PostgreSQL` via sqlx
//! - [`memory::MemoryStore`] - process memory, for local runs and tests
//!
//! ## Tables
//!
//! - `users` - Accounts with Argon2 password hashes
//! - `complaints` - Complaint records
//! - `system_settings` - Single-row mail and branding settings
//! - `notification_preferences` - Per-account notification switches
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p compass-cli -- migrate
//! ```

pub mod complaints;
pub mod memory;
pub mod settings;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use complaints::{ComplaintRepository, PgComplaintRepository};
pub use memory::MemoryStore;
pub use settings::{PgSettingsRepository, SettingsRepository};
pub use users::{PgUserRepository, UserRepository};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// The store could not be reached (pool exhausted, closed, or I/O failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable(err.to_string())
            }
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                Self::Conflict(db_err.message().to_owned())
            }
            other => Self::Database(other),
        }
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// The three repositories a running server needs, behind trait objects.
#[derive(Clone)]
pub struct Store {
    pub complaints: Arc<dyn ComplaintRepository>,
    pub users: Arc<dyn UserRepository>,
    pub settings: Arc<dyn SettingsRepository>,
}

impl Store {
    /// Repositories backed by a `PostgreSQL` pool.
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            complaints: Arc::new(PgComplaintRepository::new(pool.clone())),
            users: Arc::new(PgUserRepository::new(pool.clone())),
            settings: Arc::new(PgSettingsRepository::new(pool)),
        }
    }

    /// Repositories sharing one in-memory store.
    #[must_use]
    pub fn memory() -> Self {
        Self::from_memory(&Arc::new(MemoryStore::default()))
    }

    /// Repositories backed by an existing in-memory store.
    #[must_use]
    pub fn from_memory(store: &Arc<MemoryStore>) -> Self {
        Self {
            complaints: store.clone(),
            users: store.clone(),
            settings: store.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_unavailable() {
        assert!(matches!(
            RepositoryError::from(sqlx::Error::PoolTimedOut),
            RepositoryError::Unavailable(_)
        ));
        assert!(matches!(
            RepositoryError::from(sqlx::Error::PoolClosed),
            RepositoryError::Unavailable(_)
        ));
    }

    #[test]
    fn test_other_errors_are_database() {
        assert!(matches!(
            RepositoryError::from(sqlx::Error::RowNotFound),
            RepositoryError::Database(_)
        ));
    }
}
