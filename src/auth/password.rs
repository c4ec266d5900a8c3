use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::error;

use crate::error::{AuthError, AuthResult};

pub fn hash_password(plain: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            AuthError::internal(e)
        })?
        .to_string();
    Ok(hash)
}

/// Constant-time check of `plain` against a PHC-format digest.
pub fn verify_password(plain: &str, digest: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(digest).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        AuthError::internal(e)
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
