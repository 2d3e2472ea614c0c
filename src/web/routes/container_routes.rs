use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    routing::{get, post},
};
use serde_json::Value;
use std::sync::Arc;

use crate::db::enums::ControlAction;
use crate::server::dispatcher::GatewayRequest;
use crate::web::error::AppError;
use crate::web::extract::{CurrentSession, PublicBase};
use crate::web::models::{ListContainersQuery, LogsQuery};
use crate::web::AppState;

use super::dispatch;

pub fn create_container_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/containers", get(list_containers))
        .route("/containers/{id}", get(inspect_container))
        .route("/containers/{id}/logs", get(container_logs))
        .route("/containers/{id}/stats", get(container_stats))
        .route("/containers/{id}/{action}", post(control_container))
}

async fn list_containers(
    State(app_state): State<Arc<AppState>>,
    current: CurrentSession,
    PublicBase(public_base): PublicBase,
    query: Result<Query<ListContainersQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let request = GatewayRequest::ListContainers {
        all: query.all.unwrap_or(true),
        public_base,
    };
    dispatch(&app_state, &current, request).await
}

async fn inspect_container(
    State(app_state): State<Arc<AppState>>,
    current: CurrentSession,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    dispatch(&app_state, &current, GatewayRequest::InspectContainer { id }).await
}

async fn container_logs(
    State(app_state): State<Arc<AppState>>,
    current: CurrentSession,
    Path(id): Path<String>,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> Result<Json<Value>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let request = GatewayRequest::ContainerLogs {
        id,
        tail: query.tail,
    };
    dispatch(&app_state, &current, request).await
}

async fn container_stats(
    State(app_state): State<Arc<AppState>>,
    current: CurrentSession,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    dispatch(&app_state, &current, GatewayRequest::ContainerStats { id }).await
}

async fn control_container(
    State(app_state): State<Arc<AppState>>,
    current: CurrentSession,
    Path((id, action)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let action: ControlAction = action.parse().map_err(AppError::Validation)?;
    dispatch(&app_state, &current, GatewayRequest::ControlContainer { id, action }).await
}
