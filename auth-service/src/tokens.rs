use chrono::{DateTime, Duration, Utc};
use common_auth::{ServiceClaims, SessionClaims, SIGNING_ALGORITHM};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::User;

pub const SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
pub const SERVICE_TTL_SECONDS: i64 = 2 * 60;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub session_ttl_seconds: i64,
    pub service_ttl_seconds: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: SESSION_TTL_SECONDS,
            service_ttl_seconds: SERVICE_TTL_SECONDS,
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("No signing key configured. Provide JWT_SECURITY_KEY")]
    MissingSecret,
    #[error("failed to sign token: {0}")]
    SigningFailed(String),
}

/// Session claims carry role names only, not role records.
pub fn build_session_claims(
    user: &User,
    organization_id: Uuid,
    issued_at: DateTime<Utc>,
    ttl: Duration,
) -> SessionClaims {
    SessionClaims {
        user_id: user.id,
        roles: user.roles.clone(),
        organization_id,
        exp: (issued_at + ttl).timestamp(),
    }
}

/// Identity-free claims used only to call the organization service.
pub fn build_service_claims(issued_at: DateTime<Utc>, ttl: Duration) -> ServiceClaims {
    ServiceClaims {
        exp: (issued_at + ttl).timestamp(),
    }
}

pub struct IssuedToken {
    pub token: String,
    pub claims: SessionClaims,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Signs claim sets with the process-wide HS512 secret.
pub struct TokenIssuer {
    config: TokenConfig,
    encoding_key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], config: TokenConfig) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }
        Ok(Self {
            config,
            encoding_key: EncodingKey::from_secret(secret),
        })
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn issue<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        encode(&Header::new(SIGNING_ALGORITHM), claims, &self.encoding_key)
            .map_err(|err| TokenError::SigningFailed(err.to_string()))
    }

    pub fn issue_session(
        &self,
        user: &User,
        organization_id: Uuid,
    ) -> Result<IssuedToken, TokenError> {
        let issued_at = Utc::now();
        let ttl = Duration::seconds(self.config.session_ttl_seconds);
        let claims = build_session_claims(user, organization_id, issued_at, ttl);
        let token = self.issue(&claims)?;

        Ok(IssuedToken {
            token,
            claims,
            issued_at,
            expires_at: issued_at + ttl,
        })
    }

    pub fn issue_service_token(&self) -> Result<String, TokenError> {
        let claims = build_service_claims(
            Utc::now(),
            Duration::seconds(self.config.service_ttl_seconds),
        );
        self.issue(&claims)
    }
}
