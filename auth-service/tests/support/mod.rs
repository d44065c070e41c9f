#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use auth_service::config::{AuthConfig, OrganizationServiceConfig, RootUserConfig};
use auth_service::metrics::AuthMetrics;
use auth_service::models::{NewUser, Role, User};
use auth_service::organizations::{OrganizationError, OrganizationResolver};
use auth_service::password::hash_password;
use auth_service::store::{CredentialStore, StoreError, StoreResult};
use auth_service::tokens::{TokenConfig, TokenIssuer};
use auth_service::{router, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use common_auth::{JwtConfig, JwtVerifier, RoleSet};
use dirs::cache_dir;
use pg_embed::pg_enums::PgAuthMethod;
use pg_embed::pg_fetch::{PgFetchSettings, PG_V13};
use pg_embed::postgres::{PgEmbed, PgSettings};
use portpicker::pick_unused_port;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_SECRET: &str = "auth-service-test-secret";

/// Credential store backed by a vector; mirrors the Postgres semantics the
/// handlers rely on (email uniqueness, role replacement on update).
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: Mutex<Vec<User>>,
    roles: Mutex<Vec<Role>>,
}

impl InMemoryCredentialStore {
    pub fn user_count(&self) -> usize {
        self.users.lock().expect("users lock").len()
    }

    pub fn snapshot(&self) -> Vec<User> {
        self.users.lock().expect("users lock").clone()
    }

    pub async fn seed(&self, name: &str, email: &str, password: &str, roles: &[&str]) -> User {
        self.create(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            password_hash: hash_password(password).expect("hash password"),
            roles: roles.iter().copied().collect::<RoleSet>(),
        })
        .await
        .expect("seed user")
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let users = self.users.lock().expect("users lock");
        Ok(users.iter().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let users = self.users.lock().expect("users lock");
        Ok(users.iter().find(|user| user.id == id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        Ok(self.snapshot())
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut users = self.users.lock().expect("users lock");
        if users.iter().any(|existing| existing.email == user.email) {
            return Err(StoreError::Conflict);
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            roles: user.roles,
            created_at: now,
            updated_at: now,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn update(&self, user: &User) -> StoreResult<User> {
        let mut users = self.users.lock().expect("users lock");
        if users
            .iter()
            .any(|existing| existing.email == user.email && existing.id != user.id)
        {
            return Err(StoreError::Conflict);
        }
        let stored = users
            .iter_mut()
            .find(|existing| existing.id == user.id)
            .ok_or(StoreError::NotFound(user.id))?;
        *stored = user.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut users = self.users.lock().expect("users lock");
        let before = users.len();
        users.retain(|user| user.id != id);
        Ok(users.len() != before)
    }

    async fn ensure_role(&self, name: &str) -> StoreResult<Role> {
        let mut roles = self.roles.lock().expect("roles lock");
        if let Some(role) = roles.iter().find(|role| role.name == name) {
            return Ok(role.clone());
        }
        let now = Utc::now();
        let role = Role {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        roles.push(role.clone());
        Ok(role)
    }
}

/// Organization resolver that counts calls and either answers with a fixed
/// organization or fails as if the service were down.
pub struct RecordingOrganizationResolver {
    organization_id: Uuid,
    reachable: bool,
    calls: AtomicUsize,
}

impl RecordingOrganizationResolver {
    pub fn answering(organization_id: Uuid) -> Self {
        Self {
            organization_id,
            reachable: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            organization_id: Uuid::nil(),
            reachable: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrganizationResolver for RecordingOrganizationResolver {
    async fn resolve(&self, _user_id: Uuid) -> Result<Uuid, OrganizationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reachable {
            Ok(self.organization_id)
        } else {
            Err(OrganizationError::Unreachable("connection refused".to_string()))
        }
    }
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        database_url: "postgres://unused".to_string(),
        database_max_connections: 1,
        jwt_secret: TEST_SECRET.to_string(),
        organizations: OrganizationServiceConfig {
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 5002,
            timeout_seconds: 1,
        },
        root_user: RootUserConfig {
            name: "root".to_string(),
            email: "root@admin.com".to_string(),
            password: "root-password".to_string(),
        },
        allow_self_registration: true,
        registration_default_role: Some("user".to_string()),
        cors_allowed_origins: vec!["http://localhost:3000".to_string()],
        host: "127.0.0.1".to_string(),
        port: 0,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<InMemoryCredentialStore>,
    pub organizations: Arc<RecordingOrganizationResolver>,
}

impl TestApp {
    pub fn new(organizations: RecordingOrganizationResolver) -> Self {
        Self::with_config(test_config(), organizations)
    }

    pub fn with_config(config: AuthConfig, organizations: RecordingOrganizationResolver) -> Self {
        let store = Arc::new(InMemoryCredentialStore::default());
        let organizations = Arc::new(organizations);
        let token_issuer = Arc::new(
            TokenIssuer::new(config.jwt_secret.as_bytes(), TokenConfig::default())
                .expect("token issuer"),
        );
        let jwt_verifier = Arc::new(
            JwtVerifier::new(JwtConfig::new(config.jwt_secret.as_bytes())).expect("verifier"),
        );

        let state = AppState {
            store: store.clone(),
            token_issuer,
            jwt_verifier,
            organizations: organizations.clone(),
            config: Arc::new(config),
            metrics: Arc::new(AuthMetrics::new().expect("metrics")),
        };

        Self {
            state,
            store,
            organizations,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub fn token_for(&self, user: &User) -> String {
        self.state
            .token_issuer
            .issue_session(user, Uuid::new_v4())
            .expect("issue session")
            .token
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };
        self.send_request(request).await
    }

    pub async fn send_request(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self
            .router()
            .oneshot(request)
            .await
            .context("router call failed")?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok((status, value))
    }
}

pub struct TestDatabase {
    pool: PgPool,
    embedded: Option<EmbeddedPg>,
}

impl TestDatabase {
    pub async fn setup() -> Result<Option<Self>> {
        if env::var("AUTH_TEST_DATABASE_URL").is_err() && !env_flag_enabled("AUTH_TEST_USE_EMBED") {
            eprintln!(
                "Skipping auth-service integration tests: set AUTH_TEST_DATABASE_URL or AUTH_TEST_USE_EMBED=1 to run them.",
            );
            return Ok(None);
        }

        let mut embedded = None;
        let database_url = if let Ok(url) = env::var("AUTH_TEST_DATABASE_URL") {
            url
        } else {
            if env_flag_enabled("AUTH_TEST_EMBED_CLEAR_CACHE") {
                if let Some(cache_dir) = cache_dir() {
                    let _ = std::fs::remove_dir_all(cache_dir.join("pg-embed"));
                }
            }

            let temp = tempdir()?;
            let port = pick_unused_port()
                .context("failed to find available port for embedded Postgres")?;

            let mut fetch_settings = PgFetchSettings::default();
            fetch_settings.version = PG_V13;

            let mut pg = PgEmbed::new(
                PgSettings {
                    database_dir: temp.path().to_path_buf(),
                    port,
                    user: "postgres".to_string(),
                    password: "postgres".to_string(),
                    auth_method: PgAuthMethod::Plain,
                    persistent: false,
                    timeout: Some(Duration::from_secs(30)),
                    migration_dir: None,
                },
                fetch_settings,
            )
            .await?;

            pg.setup().await?;
            pg.start_db().await?;

            let uri = format!("{}/postgres", pg.db_uri);
            embedded = Some(EmbeddedPg {
                pg,
                _temp_dir: temp,
            });
            uri
        };

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await?;

        run_migrations(&pool).await?;
        sqlx::query("TRUNCATE user_roles, users, roles")
            .execute(&pool)
            .await?;

        Ok(Some(Self { pool, embedded }))
    }

    pub fn pool_clone(&self) -> PgPool {
        self.pool.clone()
    }

    pub async fn teardown(self) -> Result<()> {
        self.pool.close().await;
        if let Some(embedded) = self.embedded {
            embedded.shutdown().await;
        }
        Ok(())
    }
}

struct EmbeddedPg {
    pg: PgEmbed,
    _temp_dir: TempDir,
}

impl EmbeddedPg {
    async fn shutdown(mut self) {
        let _ = self.pg.stop_db().await;
    }
}

/// Applies the schema statement by statement; every statement is idempotent.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrations_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("migrations");
    let mut entries = std::fs::read_dir(&migrations_dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        let sql = std::fs::read_to_string(&path)?;
        for statement in sql.split(';') {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                continue;
            }
            sqlx::query(trimmed).execute(pool).await?;
        }
    }

    Ok(())
}

fn env_flag_enabled(key: &str) -> bool {
    matches!(env::var(key), Ok(value) if is_truthy(value.as_str()))
}

fn is_truthy(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}
