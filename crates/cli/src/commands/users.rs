//! Account management commands.

use compass_core::{Email, Role};
use compass_server::db::{PgUserRepository, RepositoryError, UserRepository};
use compass_server::models::NewUser;
use compass_server::services::auth::{hash_password, validate_password};

use super::{CliError, connect};

/// Environment variable read when `--password` is not given.
const PASSWORD_ENV: &str = "COMPASS_NEW_USER_PASSWORD";

/// Create an account with a policy-checked, Argon2-hashed password.
///
/// # Errors
///
/// Returns an error for an invalid email, role or password, an existing
/// account, or a database failure.
pub async fn create(email: &str, role: &str, password: Option<String>) -> Result<(), CliError> {
    let email = Email::parse(email).map_err(|_| CliError::InvalidEmail(email.to_owned()))?;
    let role: Role = role
        .parse()
        .map_err(|_| CliError::InvalidRole(role.to_owned()))?;

    let password = password
        .or_else(|| std::env::var(PASSWORD_ENV).ok())
        .filter(|p| !p.is_empty())
        .ok_or(CliError::MissingPassword)?;
    validate_password(&password)?;
    let password_hash = hash_password(&password)?;

    let users = PgUserRepository::new(connect().await?);

    tracing::info!("Creating user: {} ({})", email, role);
    let user = users
        .create(NewUser {
            email: email.clone(),
            password_hash,
            role,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => CliError::UserExists(email.to_string()),
            other => CliError::Repository(other),
        })?;

    tracing::info!(
        "User created successfully! ID: {}, Email: {}, Role: {}",
        user.id,
        user.email,
        user.role
    );
    Ok(())
}

/// Activate or deactivate an account.
///
/// # Errors
///
/// Returns an error if no account has this email or the database fails.
pub async fn set_active(email: &str, active: bool) -> Result<(), CliError> {
    let parsed = Email::parse(email).map_err(|_| CliError::InvalidEmail(email.to_owned()))?;
    let users = PgUserRepository::new(connect().await?);

    let user = users
        .set_active(&parsed, active)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => CliError::UserNotFound(email.to_owned()),
            other => CliError::Repository(other),
        })?;

    if active {
        tracing::info!("User {} activated", user.email);
    } else {
        tracing::info!("User {} deactivated", user.email);
    }
    Ok(())
}
