//! Read-side handlers

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;

use crate::{
    db::{BotStore, PgBotStore},
    models::GridBot,
    AppState,
};

/// GET / - Liveness banner
pub async fn root() -> Json<Value> {
    Json(json!({ "status": "online" }))
}

/// GET /bots - Every synced bot, ordered by local id
pub async fn list_bots(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<GridBot>>, (StatusCode, String)> {
    let bots = PgBotStore::new(state.db.clone())
        .list_all()
        .await
        .map_err(|e| {
            error!("Database error while fetching bots: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred".to_string())
        })?;

    Ok(Json(bots))
}
