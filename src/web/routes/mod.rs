use axum::Json;
use serde_json::Value;

use crate::server::dispatcher::GatewayRequest;
use crate::web::error::AppError;
use crate::web::extract::CurrentSession;
use crate::web::models::envelope;
use crate::web::AppState;

pub mod audit_routes;
pub mod container_routes;
pub mod service_routes;

async fn dispatch(
    state: &AppState,
    current: &CurrentSession,
    request: GatewayRequest,
) -> Result<Json<Value>, AppError> {
    let reply = state.dispatcher.dispatch(current.session(), request).await?;
    Ok(envelope(reply))
}
