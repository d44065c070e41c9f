use axum::{http::{StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use serde::Serialize;

/// Wire envelope for every error the service returns.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    pub error: String,
}

/// Error taxonomy surfaced at the HTTP boundary. Messages are caller-safe
/// text; internal causes are logged where they happen and never carried here.
#[derive(Debug)]
pub enum ApiError {
    InvalidCredentials,
    Unauthorized { code: &'static str, message: String },
    Forbidden { message: String },
    BadRequest { code: &'static str, message: String },
    Conflict { code: &'static str, message: String },
    NotFound { code: &'static str, message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self { Self::BadRequest { code, message: message.into() } }
    pub fn forbidden(message: impl Into<String>) -> Self { Self::Forbidden { message: message.into() } }
    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self { Self::Conflict { code, message: message.into() } }
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self { Self::NotFound { code, message: message.into() } }
    pub fn internal(message: impl Into<String>) -> Self { Self::Internal { message: message.into() } }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCredentials | ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            // Duplicate-email conflicts are reported as 400 to existing clients.
            ApiError::BadRequest { .. } | ApiError::Conflict { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidCredentials => "invalid_credentials",
            ApiError::Unauthorized { code, .. } => *code,
            ApiError::Forbidden { .. } => "forbidden",
            ApiError::BadRequest { code, .. } => *code,
            ApiError::Conflict { code, .. } => *code,
            ApiError::NotFound { code, .. } => *code,
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.code();
        let message = match self {
            ApiError::InvalidCredentials => "Invalid credentials".to_string(),
            ApiError::Unauthorized { message, .. }
            | ApiError::Forbidden { message }
            | ApiError::BadRequest { message, .. }
            | ApiError::Conflict { message, .. }
            | ApiError::NotFound { message, .. }
            | ApiError::Internal { message } => message,
        };
        let body = ErrorBody { code: error_code.into(), error: message };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
