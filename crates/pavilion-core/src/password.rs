//! Password hashing and verification.
//!
//! Hashes are salted argon2 PHC strings; verification is constant-time by
//! construction. A mismatch is `Ok(false)`; only a malformed hash or a
//! failing primitive produces an error.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::error::{CoreError, CoreResult};

pub fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CoreError::Hash(format!("failed to hash password: {e}")))?;

    Ok(hash.to_string())
}

pub fn verify_password(hash: &str, password: &str) -> CoreResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|e| CoreError::Hash(format!("invalid password hash: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify_roundtrip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password(&hash, "correct horse battery staple").unwrap());
    }

    #[test]
    fn wrong_password_does_not_verify() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(!verify_password(&hash, "Tr0ub4dor&3").unwrap());
        assert!(!verify_password(&hash, "").unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same input").unwrap();
        let b = hash_password("same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let result = verify_password("not-a-phc-string", "whatever");
        assert!(matches!(result, Err(CoreError::Hash(_))));
    }
}
