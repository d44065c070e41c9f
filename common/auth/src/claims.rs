use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::roles::RoleSet;

pub const CLAIM_USER_ID: &str = "userId";
pub const CLAIM_ROLES: &str = "roles";
pub const CLAIM_ORGANIZATION_ID: &str = "organizationId";
pub const CLAIM_EXPIRY: &str = "exp";

/// Payload of a user session token.
///
/// The issuer and the verifier share this type so claim keys cannot drift
/// between them. A token without `userId` never decodes into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub roles: RoleSet,
    #[serde(rename = "organizationId")]
    pub organization_id: Uuid,
    pub exp: i64,
}

impl SessionClaims {
    pub fn expires_at(&self) -> AuthResult<DateTime<Utc>> {
        timestamp(CLAIM_EXPIRY, self.exp)
    }

    pub fn is_admin(&self) -> bool {
        self.roles.is_admin()
    }
}

/// Payload of an internal service token: expiry only, no identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceClaims {
    pub exp: i64,
}

impl ServiceClaims {
    pub fn expires_at(&self) -> AuthResult<DateTime<Utc>> {
        timestamp(CLAIM_EXPIRY, self.exp)
    }
}

fn timestamp(claim: &'static str, value: i64) -> AuthResult<DateTime<Utc>> {
    Utc.timestamp_opt(value, 0)
        .single()
        .ok_or_else(|| AuthError::InvalidClaim(claim, value.to_string()))
}
