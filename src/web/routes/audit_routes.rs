use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    routing::get,
};
use serde_json::Value;
use std::sync::Arc;

use crate::server::dispatcher::GatewayRequest;
use crate::web::error::AppError;
use crate::web::extract::CurrentSession;
use crate::web::models::AuditQuery;
use crate::web::AppState;

use super::dispatch;

pub fn create_audit_router() -> Router<Arc<AppState>> {
    Router::new().route("/audit", get(recent_entries))
}

async fn recent_entries(
    State(app_state): State<Arc<AppState>>,
    current: CurrentSession,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    dispatch(&app_state, &current, GatewayRequest::ReadAuditLog { limit: query.limit }).await
}
