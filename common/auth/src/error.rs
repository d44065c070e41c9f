use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("signing secret is not configured")]
    MissingSecret,
    #[error("token verification failed: {0}")]
    Verification(String),
    #[error("token has expired")]
    Expired,
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Verification(value.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    error: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => {
                (StatusCode::UNAUTHORIZED, "AUTH_HEADER")
            }
            AuthError::Verification(_) | AuthError::Expired => {
                (StatusCode::UNAUTHORIZED, "AUTH_TOKEN")
            }
            AuthError::InvalidClaim(_, _) => (StatusCode::UNAUTHORIZED, "AUTH_CLAIMS"),
            AuthError::MissingSecret => (StatusCode::INTERNAL_SERVER_ERROR, "AUTH_CONFIG"),
        };

        // Verification detail stays in the logs; callers only learn the category.
        let message = match &self {
            AuthError::MissingSecret => "Authentication is unavailable".to_string(),
            AuthError::Expired => "Token has expired".to_string(),
            AuthError::MissingAuthorization => self.to_string(),
            _ => "Invalid or malformed token".to_string(),
        };

        let body = ErrorBody {
            code,
            error: message,
        };
        (status, Json(body)).into_response()
    }
}
