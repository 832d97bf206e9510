//! Health check endpoints for load balancers and monitoring

use axum::{extract::State, http::StatusCode, Json};
use bybit_client::SourceHealth;
use serde::Serialize;
use std::sync::Arc;

use crate::db::{BotStore, PgBotStore};
use crate::observability::{Logger, MetricsSnapshot};
use crate::AppState;

const HEALTHY: &str = "healthy";
const UNHEALTHY: &str = "unhealthy";

/// Basic health check - fast, no external dependencies
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Readiness check - verifies database connectivity
pub async fn readyz(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    match PgBotStore::new(state.db.clone()).ping().await {
        Ok(()) => Ok(Json(ReadinessResponse {
            status: "ready".to_string(),
            checks: vec![HealthCheck {
                name: "database".to_string(),
                status: "ok".to_string(),
            }],
        })),
        Err(e) => {
            tracing::error!("Readiness check failed: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

/// GET /health - Database and brokerage reachability.
///
/// Always answers 200; the body says whether both dependencies are up.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = database_status(&state).await;
    let bybit_api = bybit_status(&state).await;

    let status = if database == HEALTHY && bybit_api == HEALTHY {
        HEALTHY
    } else {
        UNHEALTHY
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dependencies: Dependencies {
            database: database.to_string(),
            bybit_api: bybit_api.to_string(),
        },
    })
}

/// Detailed health check with sync metrics and the source's own view of itself
pub async fn health_detail(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DetailedHealthResponse>, StatusCode> {
    let database = database_status(&state).await;
    let all_ok = database == HEALTHY;

    let response = DetailedHealthResponse {
        status: if all_ok { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: vec![HealthCheck {
            name: "database".to_string(),
            status: database.to_string(),
        }],
        source: state.source.health().await,
        metrics: state.metrics.snapshot().await,
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

async fn database_status(state: &AppState) -> &'static str {
    let status = match PgBotStore::new(state.db.clone()).ping().await {
        Ok(()) => HEALTHY,
        Err(e) => {
            tracing::error!("Database health check failed: {}", e);
            UNHEALTHY
        }
    };
    Logger::dependency_event("database", status);
    status
}

async fn bybit_status(state: &AppState) -> &'static str {
    let status = match state.source.check_api_status().await {
        Ok(true) => HEALTHY,
        Ok(false) => UNHEALTHY,
        Err(e) => {
            tracing::error!("Bybit API health check failed: {}", e);
            UNHEALTHY
        }
    };
    Logger::dependency_event("bybit_api", status);
    status
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: Vec<HealthCheck>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub dependencies: Dependencies,
}

#[derive(Serialize)]
pub struct Dependencies {
    pub database: String,
    pub bybit_api: String,
}

#[derive(Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub version: String,
    pub checks: Vec<HealthCheck>,
    pub source: SourceHealth,
    pub metrics: MetricsSnapshot,
}

#[derive(Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
}
