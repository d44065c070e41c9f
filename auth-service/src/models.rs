use std::fmt;

use chrono::{DateTime, Utc};
use common_auth::RoleSet;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use uuid::Uuid;

use crate::password::{hash_password, verify_password, PasswordError};

/// Value a hidden record carries in place of its password hash.
pub const MASKED_PASSWORD_HASH: &str = "***";

#[derive(Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    #[serde(rename = "username")]
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub roles: RoleSet,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn set_password(&mut self, password: &str) -> Result<(), PasswordError> {
        self.password_hash = hash_password(password)?;
        Ok(())
    }

    pub fn check_password(&self, password: &str) -> bool {
        verify_password(&self.password_hash, password)
    }

    pub fn is_admin(&self) -> bool {
        self.roles.is_admin()
    }

    /// Masks the password hash before the record leaves the service.
    pub fn hide(&mut self) -> &mut Self {
        self.password_hash = MASKED_PASSWORD_HASH.to_string();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hide();
        self
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.name.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Compact user view embedded in the login response.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: RoleSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Insert request for the credential store. Carries a hash, never a password.
#[derive(Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub roles: RoleSet,
}

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9._%+-]+@[a-z0-9-]+(\.[a-z0-9-]+)*\.[a-z]{2,}$")
        .expect("EMAIL_REGEX should be a valid regex pattern")
});

/// Trimmed, lowercased email when it has the shape `local@domain.tld`.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_ascii_lowercase();
    EMAIL_REGEX.is_match(&email).then_some(email)
}

pub fn normalize_username(raw: &str) -> Option<String> {
    let name = raw.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
