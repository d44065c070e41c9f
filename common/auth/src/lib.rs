pub mod claims;
pub mod config;
pub mod error;
pub mod extractors;
pub mod roles;
pub mod verifier;

pub use claims::{ServiceClaims, SessionClaims};
pub use config::JwtConfig;
pub use error::{AuthError, AuthResult};
pub use extractors::AuthContext;
pub use roles::{RoleSet, ROLE_ADMIN, ROLE_USER};
pub use verifier::{JwtVerifier, SIGNING_ALGORITHM};
