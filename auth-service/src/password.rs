use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;
use rand_core::OsRng;
use thiserror::Error;

/// Upper bound on accepted password length, in bytes.
pub const MAX_PASSWORD_LENGTH: usize = 128;

// Verified against when no account matches, so unknown emails cost the same
// as wrong passwords.
static DUMMY_HASH: Lazy<String> =
    Lazy::new(|| hash_password("dummy-password-for-timing").unwrap_or_default());

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password must not be empty")]
    Empty,
    #[error("password must be at most {MAX_PASSWORD_LENGTH} bytes")]
    TooLong,
    #[error("failed to hash password: {0}")]
    HashingFailed(String),
}

/// Salted Argon2id hash in PHC string form. The plaintext is only borrowed.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    if password.is_empty() {
        return Err(PasswordError::Empty);
    }
    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(PasswordError::TooLong);
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| PasswordError::HashingFailed(err.to_string()))
}

/// Verifies through the hash's own routine. Malformed hashes and mismatches
/// both yield `false`.
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Runs a full verification against a fixed hash, discarding the result.
pub fn verify_dummy_password(password: &str) {
    let _ = verify_password(&DUMMY_HASH, password);
}
