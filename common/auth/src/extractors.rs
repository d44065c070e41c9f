use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts};
use tracing::debug;
use uuid::Uuid;

use crate::claims::SessionClaims;
use crate::error::{AuthError, AuthResult};
use crate::roles::RoleSet;
use crate::verifier::JwtVerifier;

/// Request-scoped identity derived from a verified session token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: SessionClaims,
    pub token: String,
}

impl AuthContext {
    pub fn user_id(&self) -> Uuid {
        self.claims.user_id
    }

    pub fn roles(&self) -> &RoleSet {
        &self.claims.roles
    }

    pub fn organization_id(&self) -> Uuid {
        self.claims.organization_id
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.claims.roles.has_capability(role)
    }

    pub fn is_admin(&self) -> bool {
        self.claims.is_admin()
    }

    pub fn into_claims(self) -> SessionClaims {
        self.claims
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<JwtVerifier>::from_ref(state);

        let header_value = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthorization)?;

        let token = parse_authorization(header_value)?;
        let claims = verifier.verify(&token).map_err(|err| {
            debug!(error = %err, "rejected session token");
            err
        })?;

        Ok(Self { claims, token })
    }
}

/// Accepts `Bearer <token>` as well as the bare token the organization
/// service and older clients send.
fn parse_authorization(value: &axum::http::HeaderValue) -> AuthResult<String> {
    let raw = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorization)?
        .trim();

    let token = match raw.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return Err(AuthError::InvalidAuthorization),
        None if raw.eq_ignore_ascii_case("bearer") => "",
        None => raw,
    };

    if token.is_empty() {
        return Err(AuthError::InvalidAuthorization);
    }

    Ok(token.to_owned())
}
