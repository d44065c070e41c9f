use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use common_auth::{AuthContext, RoleSet};
use common_http_errors::{ApiError, ApiResult};
use common_security::{authorize, authorize_registration, DenyReason, SecurityError, UserAction};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::models::{normalize_email, normalize_username, NewUser, User, UserSummary};
use crate::password::{hash_password, verify_dummy_password, MAX_PASSWORD_LENGTH};
use crate::store::StoreError;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: UserSummary,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

/// Every field is optional; absent fields keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
}

fn invalid_body(rejection: JsonRejection) -> ApiError {
    warn!(error = %rejection.body_text(), "Rejected malformed request body");
    ApiError::bad_request("invalid_body", "Invalid request body")
}

fn parse_user_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::bad_request("invalid_user_id", "Invalid user ID"))
}

fn user_not_found() -> ApiError {
    ApiError::not_found("user_not_found", "User not found")
}

fn store_failure(err: StoreError, message: &'static str) -> ApiError {
    match err {
        StoreError::Conflict => ApiError::conflict("email_taken", "Email is already in use"),
        StoreError::NotFound(_) => user_not_found(),
        StoreError::Database(err) => {
            error!(error = ?err, "{message}");
            ApiError::internal(message)
        }
    }
}

fn check(state: &AppState, auth: &AuthContext, action: UserAction) -> ApiResult<()> {
    authorize(auth, action).map_err(|err| state.denied(action.name(), err))
}

fn check_new_password(password: &str) -> ApiResult<()> {
    if password.is_empty() {
        return Err(ApiError::bad_request(
            "invalid_password",
            "Password must not be empty",
        ));
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(
            "invalid_password",
            format!("Password must be at most {MAX_PASSWORD_LENGTH} bytes"),
        ));
    }
    Ok(())
}

fn hash_or_fail(password: &str) -> ApiResult<String> {
    hash_password(password).map_err(|err| {
        error!(error = %err, "Failed to hash password");
        ApiError::internal("Failed to process password")
    })
}

fn roles_from(names: Vec<String>) -> RoleSet {
    names
        .into_iter()
        .map(|name| name.trim().to_ascii_lowercase())
        .collect()
}

pub async fn login_user(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(payload) = payload.map_err(invalid_body)?;

    let email = payload.email.trim().to_ascii_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        state.record_login_metric("invalid_request");
        return Err(ApiError::bad_request(
            "missing_credentials",
            "Email and password are required",
        ));
    }
    // No stored password can be this long.
    if payload.password.len() > MAX_PASSWORD_LENGTH {
        state.record_login_metric("invalid_credentials");
        return Err(ApiError::InvalidCredentials);
    }

    let user = match state.store.find_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            verify_dummy_password(&payload.password);
            state.record_login_metric("invalid_credentials");
            return Err(ApiError::InvalidCredentials);
        }
        Err(err) => {
            state.record_login_metric("error");
            return Err(store_failure(err, "Failed to load user"));
        }
    };

    if !user.check_password(&payload.password) {
        state.record_login_metric("invalid_credentials");
        warn!(user_id = %user.id, "Login rejected: password mismatch");
        return Err(ApiError::InvalidCredentials);
    }

    let organization_id = match state.organizations.resolve(user.id).await {
        Ok(organization_id) => {
            state.record_organization_metric("success");
            organization_id
        }
        Err(err) => {
            state.record_organization_metric(err.outcome());
            state.record_login_metric("organization_error");
            error!(user_id = %user.id, error = %err, "Failed to get organization");
            return Err(ApiError::internal("Failed to get organization"));
        }
    };

    let issued = state
        .token_issuer
        .issue_session(&user, organization_id)
        .map_err(|err| {
            state.record_login_metric("error");
            error!(user_id = %user.id, error = %err, "Failed to generate token");
            ApiError::internal("Failed to generate token")
        })?;

    state.record_login_metric("success");
    info!(
        user_id = %user.id,
        %organization_id,
        expires_at = %issued.expires_at,
        "User logged in"
    );

    Ok(Json(LoginResponse {
        success: true,
        token: issued.token,
        user: user.summary(),
    }))
}

pub async fn get_self(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<UserResponse>> {
    check(&state, &auth, UserAction::ReadSelf)?;

    let user = state
        .store
        .find_by_id(auth.user_id())
        .await
        .map_err(|err| store_failure(err, "Failed to load user"))?
        .ok_or_else(user_not_found)?;

    Ok(Json(UserResponse {
        user: user.hidden(),
    }))
}

pub async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<User>>> {
    check(&state, &auth, UserAction::List)?;

    let users = state
        .store
        .list()
        .await
        .map_err(|err| store_failure(err, "Failed to list users"))?;

    Ok(Json(users.into_iter().map(User::hidden).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let target = parse_user_id(&id)?;
    check(&state, &auth, UserAction::Read { target })?;

    let user = state
        .store
        .find_by_id(target)
        .await
        .map_err(|err| store_failure(err, "Failed to load user"))?
        .ok_or_else(user_not_found)?;

    Ok(Json(UserResponse {
        user: user.hidden(),
    }))
}

pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<Json<UserResponse>> {
    let target = parse_user_id(&id)?;
    check(&state, &auth, UserAction::Update { target })?;

    let Json(payload) = payload.map_err(invalid_body)?;
    if payload.roles.is_some() {
        check(&state, &auth, UserAction::AssignRoles { target })?;
    }

    let mut user = state
        .store
        .find_by_id(target)
        .await
        .map_err(|err| store_failure(err, "Failed to load user"))?
        .ok_or_else(user_not_found)?;

    if let Some(username) = payload.username.as_deref() {
        user.name = normalize_username(username)
            .ok_or_else(|| ApiError::bad_request("invalid_username", "Username must not be empty"))?;
    }

    if let Some(email) = payload.email.as_deref() {
        user.email = normalize_email(email)
            .ok_or_else(|| ApiError::bad_request("invalid_email", "Email is not valid"))?;
    }

    if let Some(password) = payload.password.as_deref() {
        check_new_password(password)?;
        user.password_hash = hash_or_fail(password)?;
    }

    if let Some(roles) = payload.roles {
        user.roles = roles_from(roles);
    }

    let updated = state
        .store
        .update(&user)
        .await
        .map_err(|err| store_failure(err, "Failed to update user"))?;

    info!(user_id = %updated.id, actor_id = %auth.user_id(), "User updated");
    Ok(Json(UserResponse {
        user: updated.hidden(),
    }))
}

pub async fn create_user(
    State(state): State<AppState>,
    auth: Option<AuthContext>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    authorize_registration(state.config.registration_policy(), auth.as_ref())
        .map_err(|err| state.denied(UserAction::Create.name(), err))?;

    let Json(payload) = payload.map_err(invalid_body)?;

    let name = normalize_username(&payload.username)
        .ok_or_else(|| ApiError::bad_request("invalid_username", "Username must not be empty"))?;
    let email = normalize_email(&payload.email)
        .ok_or_else(|| ApiError::bad_request("invalid_email", "Email is not valid"))?;
    check_new_password(&payload.password)?;

    let roles = match payload.roles.filter(|roles| !roles.is_empty()) {
        Some(requested) => {
            match auth.as_ref() {
                Some(caller) => check(&state, caller, UserAction::Create)?,
                None => {
                    return Err(state.denied(
                        "assign_roles",
                        SecurityError::Forbidden(DenyReason::AdminOnly),
                    ))
                }
            }
            roles_from(requested)
        }
        None => state
            .config
            .registration_default_role
            .iter()
            .cloned()
            .collect(),
    };

    let password_hash = hash_or_fail(&payload.password)?;
    let created = state
        .store
        .create(NewUser {
            name,
            email,
            password_hash,
            roles,
        })
        .await
        .map_err(|err| store_failure(err, "Failed to create user"))?;

    info!(
        user_id = %created.id,
        actor_id = ?auth.as_ref().map(AuthContext::user_id),
        "User created"
    );
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            user: created.hidden(),
        }),
    ))
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let target = parse_user_id(&id)?;
    check(&state, &auth, UserAction::Delete { target })?;

    let deleted = state
        .store
        .delete(target)
        .await
        .map_err(|err| store_failure(err, "Failed to delete user"))?;
    if !deleted {
        return Err(user_not_found());
    }

    info!(user_id = %target, actor_id = %auth.user_id(), "User deleted");
    Ok(Json(MessageResponse {
        message: "User deleted successfully".to_string(),
    }))
}
