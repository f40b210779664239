use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub sessions: usize,
    pub temp_dir: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let temp_dir = state.file_ops.temp_dir();
    let status = match tokio::fs::metadata(temp_dir).await {
        Ok(meta) if meta.is_dir() => "ok",
        _ => "degraded",
    };

    Json(HealthResponse {
        status: status.to_string(),
        sessions: state.sessions.count().await,
        temp_dir: temp_dir.display().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
