use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::Method,
    middleware as axum_middleware,
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::server::config::ServerConfig;
use crate::server::dispatcher::GatewayDispatcher;
use crate::services::auth_service::Authenticator;
use crate::services::session_service::{REMEMBER_TTL_SECS, SessionKeys};
use crate::web::{
    error::AppError,
    extract::{ClientKey, CurrentSession},
    middleware::session::{self, SESSION_COOKIE},
    models::{LoginRequest, LoginResponse, UserInfo},
    routes::*,
};

pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: GatewayDispatcher,
    pub authenticator: Arc<Authenticator>,
    pub session_keys: Arc<SessionKeys>,
    pub config: Arc<ServerConfig>,
}

async fn login_handler(
    State(app_state): State<Arc<AppState>>,
    ClientKey(client_key): ClientKey,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let Json(payload) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let session = app_state
        .authenticator
        .authenticate(&client_key, &payload.username, &payload.password)
        .await?;
    let issued = app_state.session_keys.issue(&session, payload.remember)?;

    let mut auth_cookie = Cookie::build((SESSION_COOKIE, issued.token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(app_state.config.secure_cookies);
    if payload.remember {
        auth_cookie = auth_cookie.max_age(time::Duration::seconds(REMEMBER_TTL_SECS));
    }

    let body = LoginResponse {
        success: true,
        token: issued.token,
        expires_at: issued.expires_at,
        user: UserInfo {
            id: session.user_id,
            username: session.username,
            role: session.role,
        },
    };
    Ok((jar.add(auth_cookie), Json(body)))
}

async fn logout_handler(
    State(app_state): State<Arc<AppState>>,
    CurrentSession(token): CurrentSession,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Value>), AppError> {
    let token = token.ok_or(AppError::Unauthenticated)?;
    app_state
        .session_keys
        .revoke(token.token_id, token.expires_at);
    info!(user = %token.session.username, token_id = %token.token_id, "Session revoked.");

    let cleared = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::ZERO);
    Ok((jar.add(cleared), Json(json!({ "success": true }))))
}

async fn health_check_handler() -> &'static str {
    "OK"
}

pub fn create_axum_router(
    dispatcher: GatewayDispatcher,
    authenticator: Arc<Authenticator>,
    session_keys: Arc<SessionKeys>,
    config: Arc<ServerConfig>,
) -> Router {
    let app_state = Arc::new(AppState {
        dispatcher,
        authenticator,
        session_keys,
        config,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let protected = Router::new()
        .merge(container_routes::create_container_router())
        .merge(service_routes::create_service_router())
        .merge(audit_routes::create_audit_router())
        .route("/logout", post(logout_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            session::resolve_session,
        ));

    Router::new()
        .route("/health", get(health_check_handler))
        .route("/login", post(login_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}
