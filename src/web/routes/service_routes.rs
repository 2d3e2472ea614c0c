use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde_json::Value;
use std::sync::Arc;

use crate::db::enums::ControlAction;
use crate::server::dispatcher::GatewayRequest;
use crate::web::error::AppError;
use crate::web::extract::CurrentSession;
use crate::web::AppState;

use super::dispatch;

pub fn create_service_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/services", get(list_services))
        .route("/services/{name}/{action}", post(control_service))
}

async fn list_services(
    State(app_state): State<Arc<AppState>>,
    current: CurrentSession,
) -> Result<Json<Value>, AppError> {
    dispatch(&app_state, &current, GatewayRequest::ListHostServices).await
}

async fn control_service(
    State(app_state): State<Arc<AppState>>,
    current: CurrentSession,
    Path((name, action)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let action: ControlAction = action.parse().map_err(AppError::Validation)?;
    dispatch(&app_state, &current, GatewayRequest::ControlHostService { name, action }).await
}
