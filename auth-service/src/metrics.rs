use anyhow::Result;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct AuthMetrics {
    registry: Registry,
    login_attempts: IntCounterVec,
    organization_lookups: IntCounterVec,
    authorization_denials: IntCounterVec,
}

impl AuthMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let login_attempts = IntCounterVec::new(
            Opts::new(
                "auth_login_attempts_total",
                "Count of login attempts grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(login_attempts.clone()))?;

        let organization_lookups = IntCounterVec::new(
            Opts::new(
                "auth_organization_lookups_total",
                "Count of organization service lookups grouped by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(organization_lookups.clone()))?;

        let authorization_denials = IntCounterVec::new(
            Opts::new(
                "auth_authorization_denials_total",
                "Count of denied user-management operations grouped by action",
            ),
            &["action"],
        )?;
        registry.register(Box::new(authorization_denials.clone()))?;

        Ok(Self {
            registry,
            login_attempts,
            organization_lookups,
            authorization_denials,
        })
    }

    pub fn login_attempt(&self, outcome: &str) {
        self.login_attempts.with_label_values(&[outcome]).inc();
    }

    pub fn organization_lookup(&self, outcome: &str) {
        self.organization_lookups.with_label_values(&[outcome]).inc();
    }

    pub fn authorization_denied(&self, action: &str) {
        self.authorization_denials.with_label_values(&[action]).inc();
    }

    pub fn login_attempts(&self, outcome: &str) -> u64 {
        self.login_attempts.with_label_values(&[outcome]).get()
    }

    pub fn render(&self) -> Result<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))?;
        Ok(response)
    }
}
