use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct RootResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub staging: String,
    pub translator: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service banner", body = RootResponse)
    ),
    tag = "system"
)]
pub async fn read_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "BarkBack API is running!".to_string(),
    })
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
    let db_status = if state.db.ping().await.is_ok() {
        "connected"
    } else {
        "disconnected"
    };

    let staging_status = match tokio::fs::metadata(state.ingestor.staging_root()).await {
        Ok(m) if m.is_dir() => "available",
        _ => "missing",
    };

    let translator_status = if state.ingestor.translator().health_check().await {
        "ready"
    } else {
        "unavailable"
    };

    let status = if db_status == "connected" && staging_status == "available" {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: db_status.to_string(),
        staging: staging_status.to_string(),
        translator: translator_status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
