pub mod config;
pub mod db;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod handlers {
    pub mod bots;
    pub mod sync;
}

use std::sync::Arc;
use axum::{
    routing::{get, post},
    Router,
};
use bybit_client::BotSource;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Settings;
pub use db::Db;
pub use models::*;
pub use observability::{Logger, MetricsCollector};
pub use pipeline::{SyncReport, SyncService};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub source: Arc<dyn BotSource>,
    pub metrics: MetricsCollector,
}

impl AppState {
    pub fn new(db: Db, source: Arc<dyn BotSource>) -> Self {
        Self {
            db,
            source,
            metrics: MetricsCollector::new(),
        }
    }
}

/// Build the API router
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::bots::root))
        .route("/bots", get(handlers::bots::list_bots))
        .route("/bots/update", post(handlers::sync::update_bots))
        // Health checks (no auth)
        .route("/health", get(health::health))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/health/detail", get(health::health_detail))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
