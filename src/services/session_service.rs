use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::db::enums::Role;
use crate::services::auth_service::Session;

/// Lifetime of a token issued without the "remember me" flag.
pub const SESSION_TTL_SECS: i64 = 12 * 60 * 60;
/// Lifetime of a token issued with the "remember me" flag.
pub const REMEMBER_TTL_SECS: i64 = 30 * 24 * 60 * 60;

// JWT claims carried by the session cookie.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: i64,
    pub role: Role,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Token creation failed: {0}")]
    TokenCreation(String),
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// A verified token: who it belongs to and which token it was.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub session: Session,
    pub token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies session tokens, and remembers tokens revoked by logout
/// until they would have expired anyway.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    revoked: DashMap<Uuid, DateTime<Utc>>,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        // No grace period past `exp`: a purged revocation must never let an
        // expired token back in.
        let mut validation = Validation::default();
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            revoked: DashMap::new(),
        }
    }

    pub fn issue(&self, session: &Session, remember: bool) -> Result<IssuedToken, SessionError> {
        let now = Utc::now();
        let ttl = TimeDelta::seconds(if remember { REMEMBER_TTL_SECS } else { SESSION_TTL_SECS });
        let expires_at = now + ttl;
        let claims = Claims {
            sub: session.username.clone(),
            user_id: session.user_id,
            role: session.role,
            jti: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| SessionError::TokenCreation(e.to_string()))?;

        Ok(IssuedToken {
            token,
            token_id: claims.jti,
            expires_at,
        })
    }

    /// Returns the session behind `token`, or `None` if the token is
    /// malformed, badly signed, expired or revoked.
    pub fn verify(&self, token: &str) -> Option<SessionToken> {
        let data = match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => data,
            Err(e) => {
                debug!(error = ?e, "Rejected session token.");
                return None;
            }
        };
        let claims = data.claims;
        if self.revoked.contains_key(&claims.jti) {
            debug!(token_id = %claims.jti, "Rejected revoked session token.");
            return None;
        }

        Some(SessionToken {
            session: Session {
                user_id: claims.user_id,
                username: claims.sub,
                role: claims.role,
            },
            token_id: claims.jti,
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now),
        })
    }

    pub fn revoke(&self, token_id: Uuid, expires_at: DateTime<Utc>) {
        self.revoked.insert(token_id, expires_at);
    }

    /// Forgets revocations for tokens that have expired on their own. A token
    /// is kept through its final second, which `verify` still accepts.
    pub fn purge_revoked(&self, now: DateTime<Utc>) -> usize {
        let before = self.revoked.len();
        let now = now.timestamp();
        self.revoked.retain(|_, expires_at| expires_at.timestamp() >= now);
        before.saturating_sub(self.revoked.len())
    }
}
