use common_http_errors::ApiError;
use thiserror::Error;

use crate::policy::DenyReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("{0}")]
    Forbidden(DenyReason),
}

impl From<SecurityError> for ApiError {
    fn from(e: SecurityError) -> Self {
        match e {
            SecurityError::Unauthenticated => ApiError::Unauthorized {
                code: "authentication_required",
                message: e.to_string(),
            },
            SecurityError::Forbidden(_) => ApiError::forbidden(e.to_string()),
        }
    }
}
