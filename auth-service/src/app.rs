use std::sync::Arc;

use axum::extract::{FromRef, State};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use common_auth::JwtVerifier;
use common_http_errors::ApiError;
use common_security::SecurityError;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, warn};

use crate::config::AuthConfig;
use crate::metrics::AuthMetrics;
use crate::organizations::OrganizationResolver;
use crate::store::CredentialStore;
use crate::tokens::TokenIssuer;
use crate::user_handlers::{
    create_user, delete_user, get_self, get_user, list_users, login_user, update_user,
};

/// Everything a request needs, constructed once at startup and injected.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CredentialStore>,
    pub token_issuer: Arc<TokenIssuer>,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub organizations: Arc<dyn OrganizationResolver>,
    pub config: Arc<AuthConfig>,
    pub metrics: Arc<AuthMetrics>,
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_verifier.clone()
    }
}

impl AppState {
    pub fn record_login_metric(&self, outcome: &str) {
        self.metrics.login_attempt(outcome);
    }

    pub fn record_organization_metric(&self, outcome: &str) {
        self.metrics.organization_lookup(outcome);
    }

    /// Converts an authorization failure into the HTTP error, counting denials.
    pub fn denied(&self, action: &str, err: SecurityError) -> ApiError {
        if matches!(err, SecurityError::Forbidden(_)) {
            self.metrics.authorization_denied(action);
        }
        err.into()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => {
            error!(error = ?err, "Failed to render metrics");
            ApiError::internal("Failed to render metrics").into_response()
        }
    }
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login_user))
        .route("/users/me", get(get_self))
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).post(update_user).delete(delete_user),
        )
}

pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION])
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(render_metrics))
        .nest("/api/auth", api_routes())
        .with_state(state)
        .layer(cors)
}
