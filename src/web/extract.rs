use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::services::auth_service::Session;
use crate::services::session_service::SessionToken;
use crate::web::AppState;

/// Key shared by callers whose address cannot be determined.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// The session resolved by the session middleware, if any.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Option<SessionToken>);

impl CurrentSession {
    pub fn session(&self) -> Option<&Session> {
        self.0.as_ref().map(|token| &token.session)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(CurrentSession(parts.extensions.get::<SessionToken>().cloned()))
    }
}

/// Identifies the caller for login throttling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl FromRequestParts<Arc<AppState>> for ClientKey {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if state.config.trust_forwarded_for {
            if let Some(ip) = forwarded_for(&parts.headers) {
                return Ok(ClientKey(ip));
            }
        }
        let key = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        Ok(ClientKey(key))
    }
}

/// `scheme://host` the console was reached on, without the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicBase(pub Option<String>);

impl FromRequestParts<Arc<AppState>> for PublicBase {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let scheme = state
            .config
            .trust_forwarded_for
            .then(|| header_str(&parts.headers, "x-forwarded-proto"))
            .flatten()
            .unwrap_or("http");
        let base = header_str(&parts.headers, header::HOST.as_str())
            .map(strip_port)
            .filter(|host| !host.is_empty())
            .map(|host| format!("{scheme}://{host}"));
        Ok(PublicBase(base))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")?
        .split(',')
        .next()
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    host.split_once(':').map_or(host, |(name, _)| name)
}
