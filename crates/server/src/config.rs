//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `COMPASS_JWT_SECRET` - Session token signing secret (min 32 chars, high entropy)
//! - `COMPASS_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; not needed when `COMPASS_STORAGE=memory`)
//!
//! ## Optional
//! - `COMPASS_HOST` - Bind address (default: 127.0.0.1)
//! - `COMPASS_PORT` - Listen port (default: 3000)
//! - `COMPASS_BASE_URL` - Public URL, used in emails and to decide cookie `Secure`
//!   (default: `http://localhost:3000`)
//! - `COMPASS_STORAGE` - `postgres` or `memory` (default: postgres)
//! - `COMPASS_TOKEN_TTL_HOURS` - Session token lifetime (default: 168)
//! - `COMPASS_DEMO_PASSWORD` - Enables the demo administrator login when set
//! - `COMPASS_DEMO_EMAIL` - Email reported for the demo administrator
//! - `COMPASS_ADMIN_REGISTRATION_KEY` - Lets `/auth/register` create admins via `X-Admin-Key`
//! - `COMPASS_RATE_LIMIT_MAX` - Complaint submissions per window (default: 5)
//! - `COMPASS_RATE_LIMIT_WINDOW_SECS` - Window length (default: 900)
//! - `COMPASS_SYSTEM_NAME` - Name used in email subjects and bodies
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`, `SMTP_PASS`, `ADMIN_EMAIL` - Mail
//!   defaults used until an administrator saves system settings
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT` - Sentry error tracking
//! - `COMPASS_LOG_JSON` - Emit JSON logs instead of text

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use compass_core::Email;

const MIN_JWT_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Default public name of the deployment.
pub const DEFAULT_SYSTEM_NAME: &str = "Compass Complaint Center";

/// Default address reported for the demo administrator.
pub const DEFAULT_DEMO_EMAIL: &str = "example@compass.com";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Where complaints, accounts and settings are kept.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// `PostgreSQL` at the given URL.
    Postgres { database_url: SecretString },
    /// Process memory. Everything is lost on restart.
    Memory,
}

/// Compass server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// Persistence backend
    pub storage: StorageBackend,
    /// Session and account settings
    pub auth: AuthConfig,
    /// Complaint submission throttling
    pub rate_limit: RateLimitConfig,
    /// Mail settings used until an administrator stores their own
    pub mail: MailDefaults,
    /// Name shown in notifications
    pub system_name: String,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
    /// JSON log output
    pub log_json: bool,
}

/// Session token and account settings.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct AuthConfig {
    /// HMAC key for session tokens
    pub jwt_secret: SecretString,
    /// Session token lifetime
    pub token_ttl: Duration,
    /// Password for the demo administrator, `None` disables the demo login
    pub demo_password: Option<SecretString>,
    /// Email reported for the demo administrator
    pub demo_email: Email,
    /// Shared key that allows registering administrators
    pub admin_registration_key: Option<SecretString>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("token_ttl", &self.token_ttl)
            .field("demo_enabled", &self.demo_password.is_some())
            .field("demo_email", &self.demo_email)
            .field(
                "admin_registration_key",
                &self.admin_registration_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Fixed-window throttling of complaint submissions per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Submissions allowed per window
    pub max_requests: u32,
    /// Window length
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// SMTP defaults taken from the environment.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct MailDefaults {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_pass: SecretString,
    pub admin_email: String,
}

impl Default for MailDefaults {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_owned(),
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_pass: SecretString::from(String::new()),
            admin_email: String::new(),
        }
    }
}

impl std::fmt::Debug for MailDefaults {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailDefaults")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field("smtp_pass", &"[REDACTED]")
            .field("admin_email", &self.admin_email)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env("COMPASS_HOST", "127.0.0.1")?;
        let port = parse_env("COMPASS_PORT", "3000")?;
        let base_url = get_env_or_default("COMPASS_BASE_URL", "http://localhost:3000");
        url::Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("COMPASS_BASE_URL".to_owned(), e.to_string()))?;

        let storage = match get_env_or_default("COMPASS_STORAGE", "postgres").as_str() {
            "postgres" => StorageBackend::Postgres {
                database_url: get_database_url("COMPASS_DATABASE_URL")?,
            },
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "COMPASS_STORAGE".to_owned(),
                    format!("expected 'postgres' or 'memory', got '{other}'"),
                ));
            }
        };

        let jwt_secret = get_validated_secret("COMPASS_JWT_SECRET")?;
        validate_secret_length(&jwt_secret, "COMPASS_JWT_SECRET")?;
        let token_ttl = token_ttl_from_hours(parse_env("COMPASS_TOKEN_TTL_HOURS", "168")?)?;
        let demo_email = get_env_or_default("COMPASS_DEMO_EMAIL", DEFAULT_DEMO_EMAIL);
        let demo_email = Email::parse(&demo_email).map_err(|e| {
            ConfigError::InvalidEnvVar("COMPASS_DEMO_EMAIL".to_owned(), e.to_string())
        })?;

        let auth = AuthConfig {
            jwt_secret,
            token_ttl,
            demo_password: get_optional_env("COMPASS_DEMO_PASSWORD").map(SecretString::from),
            demo_email,
            admin_registration_key: get_optional_env("COMPASS_ADMIN_REGISTRATION_KEY")
                .map(SecretString::from),
        };

        let rate_limit = RateLimitConfig {
            max_requests: parse_env("COMPASS_RATE_LIMIT_MAX", "5")?,
            window: Duration::from_secs(parse_env("COMPASS_RATE_LIMIT_WINDOW_SECS", "900")?),
        };
        if rate_limit.max_requests == 0 || rate_limit.window.is_zero() {
            return Err(ConfigError::InvalidEnvVar(
                "COMPASS_RATE_LIMIT_MAX".to_owned(),
                "rate limit and window must be positive".to_owned(),
            ));
        }

        let mail = MailDefaults {
            smtp_host: get_env_or_default("SMTP_HOST", "smtp.gmail.com"),
            smtp_port: parse_env("SMTP_PORT", "587")?,
            smtp_user: get_env_or_default("SMTP_USER", ""),
            smtp_pass: SecretString::from(get_env_or_default("SMTP_PASS", "")),
            admin_email: get_env_or_default("ADMIN_EMAIL", ""),
        };

        Ok(Self {
            host,
            port,
            base_url,
            storage,
            auth,
            rate_limit,
            mail,
            system_name: get_env_or_default("COMPASS_SYSTEM_NAME", DEFAULT_SYSTEM_NAME),
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            log_json: get_optional_env("COMPASS_LOG_JSON").is_some(),
        })
    }

    /// Configuration for an in-memory deployment with defaults everywhere
    /// except the signing secret.
    #[must_use]
    pub fn in_memory(jwt_secret: SecretString) -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            base_url: "http://localhost:3000".to_owned(),
            storage: StorageBackend::Memory,
            auth: AuthConfig {
                jwt_secret,
                token_ttl: Duration::from_secs(7 * 24 * 3600),
                demo_password: None,
                demo_email: default_demo_email(),
                admin_registration_key: None,
            },
            rate_limit: RateLimitConfig::default(),
            mail: MailDefaults::default(),
            system_name: DEFAULT_SYSTEM_NAME.to_owned(),
            sentry_dsn: None,
            sentry_environment: None,
            log_json: false,
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Session cookies carry `Secure` when the public URL is https.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

fn default_demo_email() -> Email {
    Email::parse(DEFAULT_DEMO_EMAIL).unwrap_or_else(|_| unreachable!("constant is a valid email"))
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    std::env::var(primary_key)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional, non-empty environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, using `default` when it is unset.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Session lifetime from `COMPASS_TOKEN_TTL_HOURS`; zero and overflowing values are rejected.
fn token_ttl_from_hours(hours: u64) -> Result<Duration, ConfigError> {
    hours
        .checked_mul(3600)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| {
            ConfigError::InvalidEnvVar(
                "COMPASS_TOKEN_TTL_HOURS".to_owned(),
                format!("must be between 1 and {} hours", u64::MAX / 3600),
            )
        })
}

/// Validate that a signing secret meets minimum length requirements.
fn validate_secret_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_JWT_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_JWT_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
