//! Complaint route handlers.

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use compass_core::ComplaintId;

use super::{ApiResponse, json_body};
use crate::error::{AppError, Result};
use crate::middleware::{ClientKey, MaybePrincipal, RequireAdmin};
use crate::models::{Complaint, ComplaintPage, ComplaintStats};
use crate::services::validation::{ComplaintForm, ListParams, ValidationErrors, parse_list_params};
use crate::state::AppState;

/// Body of `PATCH /complaints/{id}`.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
    pub deleted_id: ComplaintId,
}

fn complaint_id(raw: &str) -> Result<ComplaintId> {
    raw.parse()
        .map_err(|_| AppError::NotFound("Complaint not found".to_owned()))
}

/// `POST /complaints`
///
/// Every request counts against the caller's submission window, including
/// ones that then fail validation.
pub async fn create(
    State(state): State<AppState>,
    client: ClientKey,
    MaybePrincipal(principal): MaybePrincipal,
    body: std::result::Result<Json<ComplaintForm>, JsonRejection>,
) -> Result<impl IntoResponse> {
    state.limiter().check(&client).await?;
    let form = json_body(body)?;

    let complaint = state.complaints().create(&form, principal.as_ref()).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(complaint, "Complaint submitted successfully"),
    ))
}

/// `GET /complaints`
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ApiResponse<ComplaintPage>>> {
    let query = parse_list_params(&params).map_err(AppError::Validation)?;
    let page = state.complaints().list(&query).await?;
    Ok(ApiResponse::data(page))
}

/// `GET /complaints/stats`
pub async fn stats(State(state): State<AppState>) -> Result<Json<ApiResponse<ComplaintStats>>> {
    let stats = state.complaints().stats(Utc::now()).await?;
    Ok(ApiResponse::data(stats))
}

/// `GET /complaints/{id}`
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Complaint>>> {
    let complaint = state.complaints().get(complaint_id(&id)?).await?;
    Ok(ApiResponse::data(complaint))
}

/// `PATCH /complaints/{id}`
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
    body: std::result::Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<ApiResponse<Complaint>>> {
    let id = complaint_id(&id)?;
    let update = json_body(body)?;

    let Some(status) = update.status.filter(|s| !s.trim().is_empty()) else {
        let mut errors = ValidationErrors::default();
        errors.push("status", "Status is required");
        return Err(AppError::Validation(errors));
    };

    let complaint = state
        .complaints()
        .update_status(id, &status, &admin)
        .await?;
    Ok(ApiResponse::with_message(
        complaint,
        "Complaint updated successfully",
    ))
}

/// `DELETE /complaints/{id}`
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Deleted>>> {
    let deleted_id = state.complaints().delete(complaint_id(&id)?, &admin).await?;
    Ok(ApiResponse::with_message(
        Deleted { deleted_id },
        "Complaint deleted successfully",
    ))
}
