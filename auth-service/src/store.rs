use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::RoleSet;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{Executor, FromRow, PgConnection, PgPool};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{NewUser, Role, User};

const UNIQUE_VIOLATION: &str = "23505";

const USER_SELECT: &str = "SELECT u.id, u.name, u.email, u.password_hash, u.created_at, u.updated_at,
        COALESCE(array_agg(r.name ORDER BY r.name) FILTER (WHERE r.name IS NOT NULL), ARRAY[]::TEXT[]) AS roles
     FROM users u
     LEFT JOIN user_roles ur ON ur.user_id = u.id
     LEFT JOIN roles r ON r.id = ur.role_id";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a user with this email already exists")]
    Conflict,
    #[error("user {0} not found")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence contract for user records and their roles. No business
/// rules live behind it; email uniqueness is enforced by the backing store.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn list(&self) -> StoreResult<Vec<User>>;
    async fn create(&self, user: NewUser) -> StoreResult<User>;
    /// Persists name, email, password hash and the full role set.
    async fn update(&self, user: &User) -> StoreResult<User>;
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
    async fn ensure_role(&self, name: &str) -> StoreResult<Role>;
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    roles: Vec<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            roles: row.roles.into_iter().collect::<RoleSet>(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Database connection established");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database connection closed");
    }
}

async fn fetch_user<'e, E>(executor: E, id: Uuid) -> StoreResult<Option<User>>
where
    E: Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, UserRow>(&format!("{USER_SELECT} WHERE u.id = $1 GROUP BY u.id"))
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(row.map(User::from))
}

async fn upsert_role(conn: &mut PgConnection, name: &str) -> StoreResult<Role> {
    let row = sqlx::query_as::<_, RoleRow>(
        "INSERT INTO roles (id, name) VALUES ($1, $2)
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
         RETURNING id, name, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_one(conn)
    .await?;
    Ok(row.into())
}

async fn replace_roles(conn: &mut PgConnection, user_id: Uuid, roles: &RoleSet) -> StoreResult<()> {
    sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;

    for name in roles.iter() {
        let role = upsert_role(&mut *conn, name).await?;
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(role.id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn email_taken(conn: &mut PgConnection, email: &str, except: Option<Uuid>) -> StoreResult<bool> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND ($2::UUID IS NULL OR id <> $2))",
    )
    .bind(email)
    .bind(except)
    .fetch_one(conn)
    .await?;
    Ok(taken)
}

fn map_unique_violation(err: sqlx::Error) -> StoreError {
    let unique = matches!(
        &err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
    );
    if unique {
        StoreError::Conflict
    } else {
        StoreError::Database(err)
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "{USER_SELECT} WHERE u.email = $1 GROUP BY u.id"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        fetch_user(&self.pool, id).await
    }

    async fn list(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "{USER_SELECT} GROUP BY u.id ORDER BY u.created_at, u.email"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn create(&self, user: NewUser) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        if email_taken(&mut *tx, &user.email, None).await? {
            return Err(StoreError::Conflict);
        }

        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, name, email, password_hash) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .execute(&mut *tx)
            .await
            .map_err(map_unique_violation)?;

        replace_roles(&mut *tx, id, &user.roles).await?;
        let created = fetch_user(&mut *tx, id).await?.ok_or(StoreError::NotFound(id))?;
        tx.commit().await?;
        Ok(created)
    }

    async fn update(&self, user: &User) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;

        if email_taken(&mut *tx, &user.email, Some(user.id)).await? {
            return Err(StoreError::Conflict);
        }

        let updated = sqlx::query(
            "UPDATE users SET name = $1, email = $2, password_hash = $3, updated_at = NOW() WHERE id = $4",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.id)
        .execute(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(user.id));
        }

        replace_roles(&mut *tx, user.id, &user.roles).await?;
        let stored = fetch_user(&mut *tx, user.id)
            .await?
            .ok_or(StoreError::NotFound(user.id))?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ensure_role(&self, name: &str) -> StoreResult<Role> {
        let mut conn = self.pool.acquire().await?;
        upsert_role(&mut conn, name).await
    }
}
