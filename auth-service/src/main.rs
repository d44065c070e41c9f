use std::sync::Arc;

use anyhow::Context;
use auth_service::bootstrap::ensure_root_user;
use auth_service::metrics::AuthMetrics;
use auth_service::organizations::HttpOrganizationResolver;
use auth_service::store::PgCredentialStore;
use auth_service::tokens::{TokenConfig, TokenIssuer};
use auth_service::{load_auth_config, router, AppState};
use common_auth::{JwtConfig, JwtVerifier};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Arc::new(load_auth_config()?);
    info!(?config, "Loaded auth-service configuration");

    let store = Arc::new(
        PgCredentialStore::connect(&config.database_url, config.database_max_connections)
            .await
            .context("Failed to connect to database")?,
    );
    sqlx::migrate!("./migrations")
        .run(store.pool())
        .await
        .context("Failed to run database migrations")?;

    ensure_root_user(store.as_ref(), &config.root_user).await?;

    let token_issuer = Arc::new(
        TokenIssuer::new(config.jwt_secret.as_bytes(), TokenConfig::default())
            .context("Failed to initialise token issuer")?,
    );
    let jwt_verifier = Arc::new(
        JwtVerifier::new(JwtConfig::new(config.jwt_secret.as_bytes()))
            .context("Failed to initialise token verifier")?,
    );
    let organizations = Arc::new(HttpOrganizationResolver::new(
        &config.organizations,
        token_issuer.clone(),
    )?);
    info!(url = organizations.url(), "Organization lookups configured");

    let state = AppState {
        store: store.clone(),
        token_issuer,
        jwt_verifier,
        organizations,
        config: config.clone(),
        metrics: Arc::new(AuthMetrics::new()?),
    };

    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "starting auth-service");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    store.close().await;
    info!("auth-service stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
