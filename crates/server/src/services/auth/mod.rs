//! Authentication service.
//!
//! Password login and registration for stored accounts, the optional demo
//! administrator, and session token resolution.

mod error;
mod token;

pub use error::AuthError;
pub use token::{Claims, TokenIssuer};

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::Utc;
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use compass_core::{Email, Role, UserId};

use crate::config::AuthConfig;
use crate::db::{RepositoryError, SettingsRepository, UserRepository};
use crate::models::{NewUser, NotificationPreferences, Principal, User};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Characters that satisfy the special-character rule.
const SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";

/// Verified against when no account matches the email.
static UNKNOWN_ACCOUNT_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("unknown-account").ok());

/// A signed-in principal and the token that proves it.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub principal: Principal,
}

/// Authentication service.
pub struct AuthService<'a> {
    users: &'a dyn UserRepository,
    settings: &'a dyn SettingsRepository,
    tokens: &'a TokenIssuer,
    config: &'a AuthConfig,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(
        users: &'a dyn UserRepository,
        settings: &'a dyn SettingsRepository,
        tokens: &'a TokenIssuer,
        config: &'a AuthConfig,
    ) -> Self {
        Self {
            users,
            settings,
            tokens,
            config,
        }
    }

    // =========================================================================
    // Login
    // =========================================================================

    /// Login with email and password.
    ///
    /// With `admin_login` set and the demo password configured, a matching
    /// password signs in the demo administrator instead of a stored account.
    /// The demo's notification preferences are reset before its token is issued.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::MissingCredentials` or `AuthError::InvalidEmail` for
    /// malformed input, and `AuthError::InvalidCredentials` when the account is
    /// unknown, inactive, or the password is wrong.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        admin_login: bool,
    ) -> Result<Session, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let email = Email::parse(email)?;

        if admin_login && self.is_demo_password(password) {
            return self.demo_login().await;
        }

        let user = self.authenticate(&email, password).await?;
        self.session_for(Principal::from(&user))
    }

    /// Verify a stored account's password and record the login.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for unknown, inactive or
    /// wrong-password accounts.
    pub async fn authenticate(&self, email: &Email, password: &str) -> Result<User, AuthError> {
        let Some((user, password_hash)) = self.users.find_credentials(email).await? else {
            if let Some(hash) = UNKNOWN_ACCOUNT_HASH.as_deref() {
                let _ = verify_password(password, hash);
            }
            return Err(AuthError::InvalidCredentials);
        };

        verify_password(password, &password_hash)?;

        if !user.is_active {
            tracing::info!(user_id = %user.id, "Login refused for inactive account");
            return Err(AuthError::InvalidCredentials);
        }

        self.users.record_login(user.id, Utc::now()).await?;
        tracing::info!(user_id = %user.id, role = %user.role, "User logged in");
        Ok(user)
    }

    fn is_demo_password(&self, password: &str) -> bool {
        let Some(expected) = &self.config.demo_password else {
            return false;
        };
        let expected = Sha256::digest(expected.expose_secret().as_bytes());
        let given = Sha256::digest(password.as_bytes());
        expected.ct_eq(&given).into()
    }

    async fn demo_login(&self) -> Result<Session, AuthError> {
        self.settings
            .save_preferences(
                UserId::DEMO,
                &NotificationPreferences::default(),
                Utc::now(),
            )
            .await?;
        tracing::info!("Demo administrator logged in; notification preferences reset");

        self.session_for(Principal {
            user_id: UserId::DEMO,
            email: self.config.demo_email.clone(),
            role: Role::Admin,
        })
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register a new account and sign it in.
    ///
    /// An admin role is granted only while no administrator exists, or when
    /// `admin_key` matches the configured registration key. Otherwise the
    /// account is created as a regular user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail`, `AuthError::WeakPassword`, or
    /// `AuthError::UserAlreadyExists`.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        requested_role: Option<Role>,
        admin_key: Option<&str>,
    ) -> Result<Session, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let email = Email::parse(email)?;
        validate_password(password)?;

        let role = match requested_role {
            Some(Role::Admin) if self.may_register_admin(admin_key).await? => Role::Admin,
            Some(Role::Admin) => {
                tracing::warn!(email = %email, "Admin registration refused; creating user account");
                Role::User
            }
            _ => Role::User,
        };

        let password_hash = hash_password(password)?;
        let user = self
            .users
            .create(NewUser {
                email,
                password_hash,
                role,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        self.session_for(Principal::from(&user))
    }

    async fn may_register_admin(&self, admin_key: Option<&str>) -> Result<bool, AuthError> {
        if let (Some(expected), Some(given)) = (&self.config.admin_registration_key, admin_key) {
            let expected = Sha256::digest(expected.expose_secret().as_bytes());
            let given = Sha256::digest(given.as_bytes());
            if bool::from(expected.ct_eq(&given)) {
                return Ok(true);
            }
        }
        Ok(self.users.count_admins().await? == 0)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    fn session_for(&self, principal: Principal) -> Result<Session, AuthError> {
        let token = self.tokens.issue(&principal)?;
        Ok(Session { token, principal })
    }

    /// The principal a token belongs to, or `None` if it is not valid.
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<Principal> {
        self.tokens.verify(token)
    }

    /// Re-check a principal against the account store.
    ///
    /// The demo administrator has no stored account and is returned as is.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unauthenticated` if the account no longer exists or
    /// has been deactivated.
    pub async fn current(&self, principal: &Principal) -> Result<Principal, AuthError> {
        if principal.is_demo() {
            return Ok(principal.clone());
        }

        match self.users.find_by_id(principal.user_id).await? {
            Some(user) if user.is_active => Ok(Principal::from(&user)),
            _ => Err(AuthError::Unauthenticated),
        }
    }
}

// =============================================================================
// Passwords
// =============================================================================

/// Check a password against the policy, reporting every rule it breaks.
///
/// # Errors
///
/// Returns `AuthError::WeakPassword` listing the failed rules.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }
    if !password.chars().any(char::is_uppercase) {
        problems.push("Password must contain at least one uppercase letter".to_owned());
    }
    if !password.chars().any(char::is_lowercase) {
        problems.push("Password must contain at least one lowercase letter".to_owned());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        problems.push("Password must contain at least one number".to_owned());
    }
    if !password.chars().any(|c| SPECIAL_CHARACTERS.contains(c)) {
        problems.push("Password must contain at least one special character".to_owned());
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(AuthError::WeakPassword(problems))
    }
}

/// Hash a password using Argon2id.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;

    use super::*;
    use crate::config::ServerConfig;
    use crate::db::MemoryStore;

    const SECRET: &str = "k3Jx9!vQ2mZp7#Lw4Rt8@Yh1Nc6$Bd0Fs5";
    const PASSWORD: &str = "Sup3r$ecret";

    struct Fixture {
        store: MemoryStore,
        tokens: TokenIssuer,
        config: AuthConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let mut config = ServerConfig::in_memory(SecretString::from(SECRET)).auth;
            config.demo_password = Some(SecretString::from("demo-pass"));
            config.admin_registration_key = Some(SecretString::from("let-me-in"));
            Self {
                store: MemoryStore::new(),
                tokens: TokenIssuer::new(&config.jwt_secret, Duration::from_secs(3600)),
                config,
            }
        }

        fn service(&self) -> AuthService<'_> {
            AuthService::new(&self.store, &self.store, &self.tokens, &self.config)
        }
    }

    #[test]
    fn test_password_policy_lists_every_failure() {
        let Err(AuthError::WeakPassword(problems)) = validate_password("abc") else {
            panic!("expected weak password");
        };
        assert_eq!(problems.len(), 4);
        assert!(problems[0].contains("at least 8 characters"));

        assert!(validate_password(PASSWORD).is_ok());
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password(PASSWORD).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(PASSWORD, &hash).is_ok());
        assert!(matches!(
            verify_password("wrong", &hash),
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_first_registration_may_be_admin() {
        let fixture = Fixture::new();
        let auth = fixture.service();

        let first = auth
            .register("Boss@Example.com", PASSWORD, Some(Role::Admin), None)
            .await
            .unwrap();
        assert_eq!(first.principal.role, Role::Admin);
        assert_eq!(first.principal.email.as_str(), "boss@example.com");

        let second = auth
            .register("other@example.com", PASSWORD, Some(Role::Admin), None)
            .await
            .unwrap();
        assert_eq!(second.principal.role, Role::User);

        let keyed = auth
            .register(
                "third@example.com",
                PASSWORD,
                Some(Role::Admin),
                Some("let-me-in"),
            )
            .await
            .unwrap();
        assert_eq!(keyed.principal.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_unknown_email_costs_a_password_check() {
        let fixture = Fixture::new();
        let auth = fixture.service();
        auth.register("known@example.com", PASSWORD, None, None)
            .await
            .unwrap();

        let known = Email::parse("known@example.com").unwrap();
        let unknown = Email::parse("unknown@example.com").unwrap();

        // Warm the placeholder hash so both timings measure one verification.
        let _ = auth.authenticate(&unknown, "Wrong$Pass1").await;

        let started = std::time::Instant::now();
        let wrong = auth.authenticate(&known, "Wrong$Pass1").await;
        let known_elapsed = started.elapsed();

        let started = std::time::Instant::now();
        let missing = auth.authenticate(&unknown, "Wrong$Pass1").await;
        let unknown_elapsed = started.elapsed();

        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
        assert!(matches!(missing, Err(AuthError::InvalidCredentials)));
        assert!(
            unknown_elapsed * 4 >= known_elapsed,
            "unknown {unknown_elapsed:?} vs known {known_elapsed:?}"
        );
        assert!(PasswordHash::new(UNKNOWN_ACCOUNT_HASH.as_deref().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let fixture = Fixture::new();
        let auth = fixture.service();
        auth.register("a@example.com", PASSWORD, None, None)
            .await
            .unwrap();
        assert!(matches!(
            auth.register("A@example.com", PASSWORD, None, None).await,
            Err(AuthError::UserAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_login_checks_password_and_activity() {
        let fixture = Fixture::new();
        let auth = fixture.service();
        auth.register("a@example.com", PASSWORD, None, None)
            .await
            .unwrap();

        let session = auth.login("A@EXAMPLE.COM", PASSWORD, false).await.unwrap();
        assert_eq!(auth.resolve(&session.token), Some(session.principal));

        assert!(matches!(
            auth.login("a@example.com", "Wrong$Pass1", false).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("nobody@example.com", PASSWORD, false).await,
            Err(AuthError::InvalidCredentials)
        ));

        let email = Email::parse("a@example.com").unwrap();
        fixture.store.set_active(&email, false).await.unwrap();
        assert!(matches!(
            auth.login("a@example.com", PASSWORD, false).await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_demo_login_resets_preferences() {
        let fixture = Fixture::new();
        let auth = fixture.service();

        let custom = NotificationPreferences {
            notification_email: "leftover@example.com".to_owned(),
            receive_new_complaints: false,
            receive_status_updates: false,
            last_updated: None,
        };
        fixture
            .store
            .save_preferences(UserId::DEMO, &custom, Utc::now())
            .await
            .unwrap();

        let session = auth
            .login("someone@example.com", "demo-pass", true)
            .await
            .unwrap();
        assert!(session.principal.is_demo());
        assert!(session.principal.is_admin());
        assert_eq!(session.principal.email, fixture.config.demo_email);

        let prefs = fixture
            .store
            .preferences(UserId::DEMO)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prefs.notification_email, "");
        assert!(prefs.receive_new_complaints);
        assert!(prefs.receive_status_updates);
    }

    #[tokio::test]
    async fn test_demo_password_requires_admin_login_flag() {
        let fixture = Fixture::new();
        assert!(matches!(
            fixture
                .service()
                .login("someone@example.com", "demo-pass", false)
                .await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_demo_disabled_without_password() {
        let mut fixture = Fixture::new();
        fixture.config.demo_password = None;
        assert!(matches!(
            fixture
                .service()
                .login("someone@example.com", "demo-pass", true)
                .await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_current_rejects_deactivated_account() {
        let fixture = Fixture::new();
        let auth = fixture.service();
        let session = auth
            .register("a@example.com", PASSWORD, None, None)
            .await
            .unwrap();
        assert!(auth.current(&session.principal).await.is_ok());

        let email = Email::parse("a@example.com").unwrap();
        fixture.store.set_active(&email, false).await.unwrap();
        assert!(matches!(
            auth.current(&session.principal).await,
            Err(AuthError::Unauthenticated)
        ));
    }
}
