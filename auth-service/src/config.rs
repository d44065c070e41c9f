use anyhow::{anyhow, Context, Result};
use common_auth::ROLE_USER;
use common_security::RegistrationPolicy;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::organizations::URI_GET_USER_ORGANIZATION;

pub const DEFAULT_ROOT_EMAIL: &str = "root@admin.com";
pub const DEFAULT_ROOT_PASSWORD: &str = "admin123";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationServiceConfig {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

impl OrganizationServiceConfig {
    pub fn lookup_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme, self.host, self.port, URI_GET_USER_ORGANIZATION
        )
    }
}

#[derive(Clone)]
pub struct RootUserConfig {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RootUserConfig {
    pub fn uses_default_password(&self) -> bool {
        self.password == DEFAULT_ROOT_PASSWORD
    }
}

impl fmt::Debug for RootUserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootUserConfig")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Process-wide settings, loaded once at startup and immutable afterwards.
#[derive(Clone)]
pub struct AuthConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub organizations: OrganizationServiceConfig,
    pub root_user: RootUserConfig,
    pub allow_self_registration: bool,
    pub registration_default_role: Option<String>,
    pub cors_allowed_origins: Vec<String>,
    pub host: String,
    pub port: u16,
}

impl AuthConfig {
    pub fn registration_policy(&self) -> RegistrationPolicy {
        if self.allow_self_registration {
            RegistrationPolicy::Open
        } else {
            RegistrationPolicy::AdminOnly
        }
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("Invalid HOST '{}'", self.host))?;
        Ok(SocketAddr::from((ip, self.port)))
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("database_url", &"<redacted>")
            .field("database_max_connections", &self.database_max_connections)
            .field("jwt_secret", &"<redacted>")
            .field("organizations", &self.organizations)
            .field("root_user", &self.root_user)
            .field("allow_self_registration", &self.allow_self_registration)
            .field("registration_default_role", &self.registration_default_role)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

pub fn load_auth_config() -> Result<AuthConfig> {
    load_from(|key| env::var(key).ok())
}

pub fn load_from<F>(lookup: F) -> Result<AuthConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let database_url = lookup("DATABASE_URL")
        .and_then(|value| normalize_optional(&value))
        .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;
    let database_max_connections = parse_number::<_, u32>(&lookup, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(10);

    let jwt_secret = lookup("JWT_SECURITY_KEY")
        .and_then(|value| normalize_optional(&value))
        .ok_or_else(|| anyhow!("JWT_SECURITY_KEY must be set to a non-empty secret"))?;

    let organizations = OrganizationServiceConfig {
        scheme: lookup("ORGANIZATIONS_SCHEME")
            .and_then(|value| normalize_optional(&value))
            .unwrap_or_else(|| "http".to_string()),
        host: lookup("ORGANIZATIONS_HOST")
            .and_then(|value| normalize_optional(&value))
            .unwrap_or_else(|| "localhost".to_string()),
        port: parse_number::<_, u16>(&lookup, "ORGANIZATIONS_PORT")?.unwrap_or(5002),
        timeout_seconds: parse_number::<_, u64>(&lookup, "ORGANIZATIONS_TIMEOUT_SECONDS")?
            .unwrap_or(5)
            .max(1),
    };

    let root_user = RootUserConfig {
        name: "root".to_string(),
        email: lookup("ROOT_USER_EMAIL")
            .and_then(|value| normalize_optional(&value))
            .unwrap_or_else(|| DEFAULT_ROOT_EMAIL.to_string()),
        password: lookup("ROOT_USER_PASSWORD")
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ROOT_PASSWORD.to_string()),
    };

    let allow_self_registration =
        bool_from(&lookup, "AUTH_ALLOW_SELF_REGISTRATION").unwrap_or(true);
    let registration_default_role = match lookup("AUTH_REGISTRATION_DEFAULT_ROLE") {
        Some(value) => normalize_optional(&value).map(|role| role.to_ascii_lowercase()),
        None => Some(ROLE_USER.to_string()),
    };

    let cors_allowed_origins = lookup("CORS_ALLOWED_ORIGINS")
        .map(|value| parse_list(&value))
        .unwrap_or_else(default_origins);

    let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
    let port = parse_number::<_, u16>(&lookup, "PORT")?.unwrap_or(5001);

    Ok(AuthConfig {
        database_url,
        database_max_connections,
        jwt_secret,
        organizations,
        root_user,
        allow_self_registration,
        registration_default_role,
        cors_allowed_origins,
        host,
        port,
    })
}

fn bool_from<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_number<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .and_then(|value| normalize_optional(&value))
        .map(|value| value.parse::<T>())
        .transpose()
        .with_context(|| format!("Failed to parse {key}"))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(|c| c == ',' || c == ';' || c == ' ')
        .filter_map(normalize_optional)
        .collect()
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
        "http://localhost:3001".to_string(),
        "http://127.0.0.1:3001".to_string(),
    ]
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
