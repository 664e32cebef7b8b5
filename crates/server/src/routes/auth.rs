//! Authentication route handlers.
//!
//! Successful login and registration return the token in the body and set it
//! as the `token` cookie, so both API clients and browsers can use it.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use cookie::{Cookie, SameSite};
use serde::{Deserialize, Serialize};

use compass_core::Role;

use super::{ApiResponse, json_body};
use crate::error::{AppError, Result};
use crate::middleware::{RequireUser, SESSION_COOKIE};
use crate::models::Principal;
use crate::services::auth::Session;
use crate::state::AppState;

/// Header carrying the administrator registration key.
const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub is_admin_login: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<Role>,
}

#[derive(Debug, Serialize)]
pub struct SessionBody {
    pub token: String,
    pub user: Principal,
}

#[derive(Debug, Serialize)]
pub struct MeBody {
    pub user: Principal,
}

fn session_cookie(state: &AppState, token: String) -> Cookie<'static> {
    let max_age = i64::try_from(state.tokens().ttl().as_secs()).unwrap_or(i64::MAX);
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(state.config().secure_cookies())
        .max_age(cookie::time::Duration::seconds(max_age))
        .path("/")
        .build()
}

fn with_cookie(mut response: Response, cookie: &Cookie<'_>) -> Result<Response> {
    let value = HeaderValue::from_str(&cookie.to_string())
        .map_err(|e| AppError::Internal(format!("invalid cookie header: {e}")))?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(response)
}

fn session_response(
    state: &AppState,
    status: StatusCode,
    session: Session,
    message: &str,
) -> Result<Response> {
    let cookie = session_cookie(state, session.token.clone());
    let body = SessionBody {
        token: session.token,
        user: session.principal,
    };
    with_cookie(
        (status, ApiResponse::with_message(body, message)).into_response(),
        &cookie,
    )
}

/// `POST /auth/login`
pub async fn login(
    State(state): State<AppState>,
    body: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response> {
    let request = json_body(body)?;
    let session = state
        .auth()
        .login(&request.email, &request.password, request.is_admin_login)
        .await?;
    session_response(&state, StatusCode::OK, session, "Login successful")
}

/// `POST /auth/register`
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Response> {
    let request = json_body(body)?;
    let admin_key = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    let session = state
        .auth()
        .register(&request.email, &request.password, request.role, admin_key)
        .await?;
    session_response(
        &state,
        StatusCode::CREATED,
        session,
        "User registered successfully",
    )
}

/// `POST /auth/logout`
pub async fn logout(State(state): State<AppState>) -> Result<Response> {
    let mut cookie = session_cookie(&state, String::new());
    cookie.make_removal();
    with_cookie(
        ApiResponse::message("Logged out successfully").into_response(),
        &cookie,
    )
}

/// `GET /auth/me`
pub async fn me(
    State(state): State<AppState>,
    RequireUser(principal): RequireUser,
) -> Result<Json<ApiResponse<MeBody>>> {
    let user = state.auth().current(&principal).await?;
    Ok(ApiResponse::data(MeBody { user }))
}
