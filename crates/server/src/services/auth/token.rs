//! Signed session tokens (HS256 JWT).

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use compass_core::{Email, Role, UserId};

use crate::models::Principal;

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: UserId,
    pub email: String,
    pub role: Role,
    /// Issued at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
}

/// Issues and verifies session tokens with one shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let key = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(key),
            decoding: DecodingKey::from_secret(key),
            validation,
            ttl,
        }
    }

    /// How long an issued token stays valid.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `principal`, valid from now for the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns the signing error from `jsonwebtoken`.
    pub fn issue(&self, principal: &Principal) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(principal, Utc::now().timestamp())
    }

    fn issue_at(
        &self,
        principal: &Principal,
        now: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: principal.user_id,
            email: principal.email.as_str().to_owned(),
            role: principal.role,
            iat: now,
            exp: now.saturating_add(ttl),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// The principal a token was issued for.
    ///
    /// Returns `None` for malformed, tampered or expired tokens.
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<Principal> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| tracing::debug!(error = %e, "Rejected session token"))
            .ok()?;

        Some(Principal {
            user_id: data.claims.sub,
            email: Email::parse(&data.claims.email).ok()?,
            role: data.claims.role,
        })
    }
}
