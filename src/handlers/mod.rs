pub mod problems;
pub mod transactions;
pub mod webhook;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
struct DbPoolStats {
    active_connections: u32,
    idle_connections: u32,
    max_connections: u32,
    usage_percent: f32,
}

#[derive(Serialize)]
struct HealthStatus {
    status: String,
    version: String,
    db: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    db_pool: Option<DbPoolStats>,
    marketplace_circuit: String,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    // Check database connectivity with a SELECT 1 query.
    let (db_status, db_pool) = match &state.db {
        Some(pool) => {
            let db_status = match sqlx::query("SELECT 1").execute(pool).await {
                Ok(_) => "connected",
                Err(_) => "disconnected",
            };

            let active_connections = pool.size();
            let max_connections = pool.options().get_max_connections();
            let usage_percent = (active_connections as f32 / max_connections as f32) * 100.0;

            let stats = DbPoolStats {
                active_connections,
                idle_connections: pool.num_idle() as u32,
                max_connections,
                usage_percent,
            };
            (db_status, Some(stats))
        }
        // Memory-backed deployments have no pool to report.
        None => ("disabled", None),
    };

    let healthy = db_status != "disconnected";
    let health_response = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        db: db_status.to_string(),
        db_pool,
        marketplace_circuit: state.marketplace.circuit_state(),
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
