use bcrypt::{hash, verify};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::db::StoreError;
use crate::db::enums::Role;
use crate::db::services::UserStore;
use crate::db::services::user_service::ensure_user;
use crate::services::rate_limiter::LoginRateLimiter;

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";
pub const DEFAULT_USER_USERNAME: &str = "user";
pub const DEFAULT_USER_PASSWORD: &str = "user";

/// Identity attached to a request once its credentials (or session token)
/// have been accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Too many failed login attempts, try again later")]
    RateLimited,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Password hashing failed: {0}")]
    Hashing(String),
    #[error("Identity store error: {0}")]
    Store(#[from] StoreError),
}

pub struct Authenticator {
    users: Arc<dyn UserStore>,
    limiter: Arc<LoginRateLimiter>,
    // Verified against when the username is unknown so both failure paths cost the same.
    dummy_hash: String,
}

impl Authenticator {
    pub async fn new(
        users: Arc<dyn UserStore>,
        limiter: Arc<LoginRateLimiter>,
        bcrypt_cost: u32,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hash_password("dockwarden-unknown-user", bcrypt_cost).await?;
        Ok(Self {
            users,
            limiter,
            dummy_hash,
        })
    }

    pub fn limiter(&self) -> &Arc<LoginRateLimiter> {
        &self.limiter
    }

    pub async fn authenticate(
        &self,
        client_key: &str,
        username: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        self.authenticate_at(client_key, username, password, Utc::now())
            .await
    }

    /// Same as [`Authenticator::authenticate`] with an explicit clock reading.
    pub async fn authenticate_at(
        &self,
        client_key: &str,
        username: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        if self.limiter.is_limited(client_key, now) {
            warn!(client = %client_key, "Login rejected: client is rate limited.");
            return Err(AuthError::RateLimited);
        }

        if username.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "Username and password must not be empty.".to_string(),
            ));
        }

        // The reservation stands as the failure record unless the login succeeds.
        let attempts = self.limiter.try_reserve(client_key, now).map_err(|_| {
            warn!(client = %client_key, "Login rejected: client is rate limited.");
            AuthError::RateLimited
        })?;

        let user = self.users.find_by_username(username).await?;
        let (candidate_hash, user) = match user {
            Some(user) => (user.password_hash.clone(), Some(user)),
            None => (self.dummy_hash.clone(), None),
        };

        let password_ok = verify_password(password, &candidate_hash).await;

        match user {
            Some(user) if password_ok => {
                self.limiter.clear(client_key);
                info!(user_id = user.id, username = %user.username, client = %client_key, "Login succeeded.");
                Ok(Session {
                    user_id: user.id,
                    username: user.username,
                    role: user.role,
                })
            }
            _ => {
                warn!(
                    client = %client_key,
                    attempts,
                    max_attempts = self.limiter.max_attempts(),
                    "Login failed: invalid credentials."
                );
                Err(AuthError::InvalidCredentials)
            }
        }
    }
}

/// Hashes on the blocking pool; bcrypt is deliberately slow.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || hash(password, cost))
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))?
        .map_err(|e| AuthError::Hashing(e.to_string()))
}

/// A malformed stored hash counts as a mismatch.
async fn verify_password(password: &str, password_hash: &str) -> bool {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    match tokio::task::spawn_blocking(move || verify(password, &password_hash)).await {
        Ok(Ok(valid)) => valid,
        Ok(Err(e)) => {
            error!(error = %e, "Stored password hash could not be verified.");
            false
        }
        Err(e) => {
            error!(error = %e, "Password verification task failed.");
            false
        }
    }
}

/// Creates the bootstrap admin and read-only accounts if they are missing.
/// Falling back to the documented default passwords is logged as insecure.
pub async fn provision_default_accounts(
    users: &dyn UserStore,
    admin_password: Option<&str>,
    user_password: Option<&str>,
    bcrypt_cost: u32,
) -> Result<(), AuthError> {
    let accounts = [
        (DEFAULT_ADMIN_USERNAME, admin_password, DEFAULT_ADMIN_PASSWORD, Role::Admin),
        (DEFAULT_USER_USERNAME, user_password, DEFAULT_USER_PASSWORD, Role::ReadOnly),
    ];

    for (username, configured, fallback, role) in accounts {
        if users.find_by_username(username).await?.is_some() {
            continue;
        }
        let password = match configured.filter(|p| !p.is_empty()) {
            Some(p) => p,
            None => {
                warn!(
                    username,
                    "No password configured for bootstrap account; using the insecure default. Change it immediately."
                );
                fallback
            }
        };
        let password_hash = hash_password(password, bcrypt_cost).await?;
        if ensure_user(users, username, &password_hash, role).await? {
            info!(username, role = %role, "Provisioned bootstrap account.");
        }
    }
    Ok(())
}
