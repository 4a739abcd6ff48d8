use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

use crate::{db, AppState};

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub database: &'static str,
    pub response_time_ms: u128,
}

/// Liveness plus a database ping. Returns 503 when the database is
/// unreachable so load balancers can drain the instance.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = serde_json::Value),
        (status = 503, description = "Database unreachable", body = serde_json::Value)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();
    match db::ping(&state.db).await {
        Ok(()) => {
            let body = HealthResponse {
                status: "up",
                version: env!("CARGO_PKG_VERSION"),
                timestamp: chrono::Utc::now().to_rfc3339(),
                database: "up",
                response_time_ms: start.elapsed().as_millis(),
            };
            (StatusCode::OK, Json(json!(body))).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            let body = json!({
                "status": "down",
                "version": env!("CARGO_PKG_VERSION"),
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "database": "down",
                "response_time_ms": start.elapsed().as_millis(),
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    }
}
