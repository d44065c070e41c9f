use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::OrganizationServiceConfig;
use crate::tokens::{TokenError, TokenIssuer};

pub const URI_GET_USER_ORGANIZATION: &str = "/api/organizations/get-user-organization";

#[derive(Debug, Error)]
pub enum OrganizationError {
    #[error("failed to issue service token: {0}")]
    ServiceToken(#[from] TokenError),
    #[error("organization service unreachable: {0}")]
    Unreachable(String),
    #[error("unexpected organization service response: {0}")]
    BadResponse(String),
}

impl OrganizationError {
    pub fn outcome(&self) -> &'static str {
        match self {
            OrganizationError::ServiceToken(_) => "token_error",
            OrganizationError::Unreachable(_) => "unreachable",
            OrganizationError::BadResponse(_) => "bad_response",
        }
    }
}

/// Looks up the organization a user belongs to.
#[async_trait]
pub trait OrganizationResolver: Send + Sync {
    async fn resolve(&self, user_id: Uuid) -> Result<Uuid, OrganizationError>;
}

#[derive(Debug, Serialize)]
struct OrganizationRequest {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct OrganizationResponse {
    #[serde(rename = "organizationId")]
    organization_id: Uuid,
}

/// Single synchronous POST per lookup, authenticated with a fresh service
/// token. No retries; the client timeout bounds the call.
pub struct HttpOrganizationResolver {
    client: Client,
    url: String,
    tokens: Arc<TokenIssuer>,
}

impl HttpOrganizationResolver {
    pub fn new(config: &OrganizationServiceConfig, tokens: Arc<TokenIssuer>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build organization service HTTP client")?;
        Ok(Self::with_client(client, config.lookup_url(), tokens))
    }

    pub fn with_client(client: Client, url: impl Into<String>, tokens: Arc<TokenIssuer>) -> Self {
        Self {
            client,
            url: url.into(),
            tokens,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl OrganizationResolver for HttpOrganizationResolver {
    async fn resolve(&self, user_id: Uuid) -> Result<Uuid, OrganizationError> {
        let token = self.tokens.issue_service_token().map_err(|err| {
            error!(error = %err, "Failed to generate service token");
            err
        })?;

        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, token)
            .json(&OrganizationRequest { id: user_id })
            .send()
            .await
            .map_err(|err| {
                error!(%user_id, url = %self.url, error = %err, "Failed to reach organization service");
                OrganizationError::Unreachable(err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(%user_id, %status, "Organization service rejected lookup");
            return Err(OrganizationError::BadResponse(format!("HTTP {status}")));
        }

        let body: OrganizationResponse = response.json().await.map_err(|err| {
            error!(%user_id, error = %err, "Failed to decode organization ID");
            OrganizationError::BadResponse(err.to_string())
        })?;

        debug!(%user_id, organization_id = %body.organization_id, "resolved organization");
        Ok(body.organization_id)
    }
}
