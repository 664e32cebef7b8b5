//! Health checks.

use axum::{extract::State, http::StatusCode};

use crate::state::AppState;

/// Liveness: the process is serving requests. Checks no dependencies.
pub async fn live() -> &'static str {
    "ok"
}

/// Readiness: 503 while the complaint store cannot be reached.
pub async fn ready(State(state): State<AppState>) -> StatusCode {
    match state.store().complaints.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
