use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use auth_service::config::OrganizationServiceConfig;
use auth_service::organizations::{
    HttpOrganizationResolver, OrganizationError, OrganizationResolver, URI_GET_USER_ORGANIZATION,
};
use auth_service::tokens::{TokenConfig, TokenIssuer};
use common_auth::{JwtConfig, JwtVerifier};
use httpmock::prelude::*;
use serde_json::json;
use uuid::Uuid;

const SECRET: &str = "organization-resolver-secret";

fn issuer() -> Arc<TokenIssuer> {
    Arc::new(TokenIssuer::new(SECRET.as_bytes(), TokenConfig::default()).expect("issuer"))
}

fn resolver_for(server: &MockServer, timeout_seconds: u64) -> Result<HttpOrganizationResolver> {
    let config = OrganizationServiceConfig {
        scheme: "http".to_string(),
        host: server.host(),
        port: server.port(),
        timeout_seconds,
    };
    HttpOrganizationResolver::new(&config, issuer())
}

#[tokio::test]
async fn resolves_organization_with_service_token() -> Result<()> {
    let server = MockServer::start_async().await;
    let user_id = Uuid::new_v4();
    let organization_id = Uuid::new_v4();

    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(URI_GET_USER_ORGANIZATION)
                .header_exists("authorization")
                .json_body(json!({ "id": user_id }));
            then.status(200)
                .json_body(json!({ "organizationId": organization_id }));
        })
        .await;

    let resolver = resolver_for(&server, 5)?;
    assert!(resolver.url().ends_with(URI_GET_USER_ORGANIZATION));

    let resolved = resolver.resolve(user_id).await?;
    assert_eq!(resolved, organization_id);
    mock.assert_async().await;
    Ok(())
}

#[tokio::test]
async fn service_token_verifies_as_service_claims_only() -> Result<()> {
    let tokens = issuer();
    let token = tokens.issue_service_token()?;

    let verifier = JwtVerifier::new(JwtConfig::new(SECRET))?;
    let claims = verifier.verify_service(&token)?;
    let remaining = claims.exp - chrono::Utc::now().timestamp();
    assert!((110..=121).contains(&remaining), "service ttl was {remaining}s");
    assert!(verifier.verify(&token).is_err());
    Ok(())
}

#[tokio::test]
async fn error_status_is_bad_response() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(URI_GET_USER_ORGANIZATION);
            then.status(500).body("boom");
        })
        .await;

    let resolver = resolver_for(&server, 5)?;
    let err = resolver
        .resolve(Uuid::new_v4())
        .await
        .expect_err("500 should fail");
    assert!(matches!(err, OrganizationError::BadResponse(_)));
    assert_eq!(err.outcome(), "bad_response");
    Ok(())
}

#[tokio::test]
async fn undecodable_body_is_bad_response() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(URI_GET_USER_ORGANIZATION);
            then.status(200).json_body(json!({ "organizationId": "not-a-uuid" }));
        })
        .await;

    let resolver = resolver_for(&server, 5)?;
    let err = resolver
        .resolve(Uuid::new_v4())
        .await
        .expect_err("bad body should fail");
    assert!(matches!(err, OrganizationError::BadResponse(_)));
    Ok(())
}

#[tokio::test]
async fn slow_service_times_out_as_unreachable() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path(URI_GET_USER_ORGANIZATION);
            then.status(200)
                .delay(Duration::from_secs(3))
                .json_body(json!({ "organizationId": Uuid::new_v4() }));
        })
        .await;

    let resolver = resolver_for(&server, 1)?;
    let err = resolver
        .resolve(Uuid::new_v4())
        .await
        .expect_err("timeout should fail");
    assert!(matches!(err, OrganizationError::Unreachable(_)));
    Ok(())
}

#[tokio::test]
async fn closed_port_is_unreachable() -> Result<()> {
    let port = portpicker::pick_unused_port().expect("free port");
    let config = OrganizationServiceConfig {
        scheme: "http".to_string(),
        host: "127.0.0.1".to_string(),
        port,
        timeout_seconds: 1,
    };
    let resolver = HttpOrganizationResolver::new(&config, issuer())?;

    let err = resolver
        .resolve(Uuid::new_v4())
        .await
        .expect_err("nothing listens on the port");
    assert_eq!(err.outcome(), "unreachable");
    Ok(())
}
