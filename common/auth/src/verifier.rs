use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::claims::{ServiceClaims, SessionClaims};
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};

/// Algorithm shared by every token this system signs or accepts.
pub const SIGNING_ALGORITHM: Algorithm = Algorithm::HS512;

/// Stateless HS512 verifier; the only shared input is the immutable secret.
#[derive(Clone)]
pub struct JwtVerifier {
    config: JwtConfig,
    key: DecodingKey,
}

impl JwtVerifier {
    pub fn new(config: JwtConfig) -> AuthResult<Self> {
        if config.secret.is_empty() {
            return Err(AuthError::MissingSecret);
        }
        let key = DecodingKey::from_secret(&config.secret);
        Ok(Self { config, key })
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Verify a user session token. Service tokens fail here because they
    /// carry no `userId` claim.
    pub fn verify(&self, token: &str) -> AuthResult<SessionClaims> {
        let claims: SessionClaims = self.decode(token)?;
        debug!(user_id = %claims.user_id, "verified session token");
        Ok(claims)
    }

    /// Verify an internal service token.
    pub fn verify_service(&self, token: &str) -> AuthResult<ServiceClaims> {
        self.decode(token)
    }

    fn decode<T: DeserializeOwned>(&self, token: &str) -> AuthResult<T> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.set_required_spec_claims(&["exp"]);
        validation.validate_aud = false;
        validation.leeway = self.config.leeway_seconds.into();

        let data = decode::<T>(token, &self.key, &validation)?;
        Ok(data.claims)
    }
}
