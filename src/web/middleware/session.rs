use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;
use tracing::debug;

use crate::web::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Attaches the caller's [`SessionToken`](crate::services::session_service::SessionToken)
/// to the request when a valid one is presented. Requests without one pass
/// through untouched; whether that is acceptable is decided per operation.
pub async fn resolve_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request<AxumBody>,
    next: Next,
) -> Response {
    if let Some(token) = presented_token(req.headers(), &jar) {
        match state.session_keys.verify(&token) {
            Some(session) => {
                req.extensions_mut().insert(session);
            }
            None => debug!(path = %req.uri().path(), "Ignoring invalid session token."),
        }
    }
    next.run(req).await
}

// Authorization header first, then the session cookie.
fn presented_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()))
}
