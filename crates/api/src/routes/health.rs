use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use portaria_db::repositories::QueueRepo;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the database is reachable.
    pub db_healthy: bool,
    /// Work-queue depth, when the database is reachable.
    pub fila: Option<i64>,
}

/// GET /health -- returns service, database, and queue health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = portaria_db::health_check(&state.pool).await.is_ok();
    let fila = if db_healthy {
        QueueRepo::depth(&state.pool).await.ok()
    } else {
        None
    };

    let status = if db_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        fila,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
