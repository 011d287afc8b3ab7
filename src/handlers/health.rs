use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::{ApiResponse, Result};
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<Json<ApiResponse<HealthResponse>>> {
    sqlx::query("SELECT 1").execute(state.db.pool()).await?;
    Ok(Json(ApiResponse::success(HealthResponse {
        status: "ok",
        storage: state.lifecycle.storage_type(),
    })))
}
