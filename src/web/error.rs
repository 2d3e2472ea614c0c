use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::db::StoreError;
use crate::runtime::RuntimeError;
use crate::server::dispatcher::GatewayError;
use crate::services::auth_service::AuthError;
use crate::services::authorizer::AuthzError;
use crate::services::session_service::SessionError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Too many failed login attempts, try again later")]
    RateLimited,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Container engine unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("Container engine error: {0}")]
    RuntimeError(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthenticated | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RuntimeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RuntimeError(_) => StatusCode::BAD_GATEWAY,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::Unauthenticated => "Authentication required".to_string(),
            AppError::InvalidCredentials => "Invalid username or password".to_string(),
            AppError::RateLimited => {
                "Too many failed login attempts, try again later".to_string()
            }
            AppError::Forbidden(msg) => msg,
            AppError::NotFound(msg) => msg,
            AppError::Validation(msg) => msg,
            AppError::RuntimeUnavailable(detail) => {
                error!(detail = %detail, "Container engine unavailable.");
                "Container engine unavailable".to_string()
            }
            AppError::RuntimeError(detail) => {
                error!(detail = %detail, "Container engine reported an error.");
                "Container engine reported an error".to_string()
            }
            AppError::Internal(detail) => {
                error!(detail = %detail, "Internal server error.");
                "Internal server error".to_string()
            }
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "error": error_message })),
        )
            .into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::RateLimited => AppError::RateLimited,
            AuthError::InvalidCredentials => AppError::InvalidCredentials,
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Hashing(msg) => AppError::Internal(format!("Password hashing error: {msg}")),
            AuthError::Store(e) => e.into(),
        }
    }
}

impl From<AuthzError> for AppError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::Unauthenticated => AppError::Unauthenticated,
            forbidden @ AuthzError::Forbidden { .. } => AppError::Forbidden(forbidden.to_string()),
        }
    }
}

impl From<RuntimeError> for AppError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::NotFound(id) => AppError::NotFound(format!("No such container: {id}")),
            RuntimeError::Unavailable(detail) => AppError::RuntimeUnavailable(detail),
            RuntimeError::Engine(detail) => AppError::RuntimeError(detail),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(format!("Database error: {err}"))
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Authz(e) => e.into(),
            GatewayError::Runtime(e) => e.into(),
            GatewayError::Store(e) => e.into(),
            GatewayError::Validation(msg) => AppError::Validation(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::Role;
    use crate::services::authorizer::Operation;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::from(AuthError::RateLimited), StatusCode::TOO_MANY_REQUESTS),
            (AppError::from(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED),
            (AppError::from(AuthzError::Unauthenticated), StatusCode::UNAUTHORIZED),
            (
                AppError::from(AuthzError::Forbidden {
                    role: Role::ReadOnly,
                    operation: Operation::StopContainer,
                }),
                StatusCode::FORBIDDEN,
            ),
            (AppError::from(RuntimeError::NotFound("x".into())), StatusCode::NOT_FOUND),
            (
                AppError::from(RuntimeError::Unavailable("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (AppError::from(RuntimeError::Engine("boom".into())), StatusCode::BAD_GATEWAY),
            (
                AppError::from(GatewayError::Validation("bad".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                AppError::from(StoreError::InvalidRecord("x".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected, "{err}");
        }
    }

    #[tokio::test]
    async fn test_internal_detail_not_exposed() {
        use http_body_util::BodyExt;

        let response = AppError::Internal("secret path /var/lib/db".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Internal server error");
    }
}
