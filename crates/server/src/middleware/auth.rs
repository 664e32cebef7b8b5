//! Authentication extractors.
//!
//! The session token is read from `Authorization: Bearer <token>` or, failing
//! that, from the `token` cookie. A missing or invalid token is simply no
//! principal; only the `Require*` extractors turn that into a rejection.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap,
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
};
use cookie::Cookie;

use crate::error::{AppError, set_sentry_user};
use crate::models::Principal;
use crate::state::AppState;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "token";

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == SESSION_COOKIE && !c.value().is_empty())
        .map(|c| c.value().to_owned())
}

/// The session token carried by a request. The header wins over the cookie.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| cookie_token(headers))
}

fn resolve(parts: &Parts, state: &AppState) -> Option<Principal> {
    let token = session_token(&parts.headers)?;
    let principal = state.auth().resolve(&token)?;
    set_sentry_user(&principal.user_id, Some(principal.email.as_str()));
    Some(principal)
}

/// Extractor for the caller's principal, if any.
pub struct MaybePrincipal(pub Option<Principal>);

impl FromRequestParts<AppState> for MaybePrincipal {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve(parts, state)))
    }
}

/// Extractor that requires any authenticated principal (401 otherwise).
pub struct RequireUser(pub Principal);

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        resolve(parts, state).map(Self).ok_or_else(|| {
            AppError::Unauthorized("Access denied. No valid token provided.".to_owned())
        })
    }
}

/// Extractor that requires an administrator (401 without a session, 403 for
/// other roles).
pub struct RequireAdmin(pub Principal);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let RequireUser(principal) = RequireUser::from_request_parts(parts, state).await?;
        if !principal.is_admin() {
            tracing::info!(user_id = %principal.user_id, path = %parts.uri.path(), "Admin route refused");
            return Err(AppError::Forbidden(
                "Access denied. Admin privileges required.".to_owned(),
            ));
        }
        Ok(Self(principal))
    }
}
