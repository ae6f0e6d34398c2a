use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::services::tracker::TickReport;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| AppError::ServiceUnavailable(format!("database unreachable: {}", e)))?;

    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    Ok((StatusCode::OK, Json(response)))
}

#[derive(Serialize)]
pub struct TrackerStatusResponse {
    pub enabled: bool,
    /// Time left on a stats API backoff imposed by a 429, zero when clear.
    pub stats_api_cooldown_ms: u64,
    pub last_tick: TickReport,
}

/// Report of the most recent completed tracker tick.
pub async fn tracker_status(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<TrackerStatusResponse>> {
    let report = state
        .tracker_report
        .read()
        .await
        .clone()
        .ok_or_else(|| AppError::NotFound("no tracker tick has completed yet".to_string()))?;

    let cooldown = state.limiter.cooldown_remaining().await;

    Ok(Json(TrackerStatusResponse {
        enabled: state.tracker_enabled,
        stats_api_cooldown_ms: cooldown.as_millis() as u64,
        last_tick: report,
    }))
}
