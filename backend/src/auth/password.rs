use bcrypt::{hash, verify, BcryptError, DEFAULT_COST};

/// Salted bcrypt hash of a plain-text password.
pub fn hash_password(password: &str) -> Result<String, BcryptError> {
    hash(password, DEFAULT_COST)
}

/// Constant-effort comparison; a malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    verify(password, hashed).unwrap_or(false)
}
