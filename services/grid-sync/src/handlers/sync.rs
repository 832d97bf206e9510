//! Sync trigger handler

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bybit_client::ListBotsRequest;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::{db::PgBotStore, pipeline::SyncService, pipeline::SyncReport, AppState};

/// Largest page the brokerage is asked for in one sync
pub const MAX_PAGE_SIZE: u32 = 500;

/// Query parameters for POST /bots/update
#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub struct SyncParams {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500))]
    pub limit: u32,
    #[serde(default)]
    pub status: i32,
}

fn default_limit() -> u32 {
    ListBotsRequest::default().limit
}

impl From<SyncParams> for ListBotsRequest {
    fn from(params: SyncParams) -> Self {
        ListBotsRequest {
            status: params.status,
            page: params.page,
            limit: params.limit,
        }
    }
}

/// POST /bots/update - Pull one page of bots from the brokerage and reconcile it
pub async fn update_bots(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SyncParams>,
) -> Result<SyncReport, (StatusCode, String)> {
    if let Err(errors) = params.validate() {
        return Err((StatusCode::BAD_REQUEST, errors.to_string()));
    }

    let service = SyncService::new(
        state.source.clone(),
        PgBotStore::new(state.db.clone()),
        state.metrics.clone(),
    );

    Ok(service.sync(&params.into()).await)
}

/// HTTP status for each report kind
pub fn report_status(report: &SyncReport) -> StatusCode {
    match report {
        SyncReport::Success { .. } => StatusCode::OK,
        SyncReport::ApiError { .. } => StatusCode::BAD_GATEWAY,
        SyncReport::PersistenceError { .. } => StatusCode::SERVICE_UNAVAILABLE,
        SyncReport::SyncError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for SyncReport {
    fn into_response(self) -> Response {
        (report_status(&self), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let success = SyncReport::Success {
            synced_count: 1,
            inserted: 1,
            updated: 0,
            skipped: 0,
            message: String::new(),
        };
        assert_eq!(report_status(&success), StatusCode::OK);
        assert_eq!(
            report_status(&SyncReport::ApiError { code: 10007, message: String::new() }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            report_status(&SyncReport::PersistenceError { code: "23505".into(), message: String::new() }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            report_status(&SyncReport::SyncError { code: "internal".into(), message: String::new() }),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_limit_bounds() {
        let params = |limit| SyncParams { page: 0, limit, status: 0 };
        assert!(params(0).validate().is_err());
        assert!(params(1).validate().is_ok());
        assert!(params(MAX_PAGE_SIZE).validate().is_ok());
        assert!(params(MAX_PAGE_SIZE + 1).validate().is_err());
    }

    #[test]
    fn test_params_become_request() {
        let request: ListBotsRequest = SyncParams { page: 3, limit: 25, status: 1 }.into();
        assert_eq!(request, ListBotsRequest { status: 1, page: 3, limit: 25 });
        assert_eq!(default_limit(), 150);
    }
}
