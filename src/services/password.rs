//! Password hashing
//!
//! Passwords are stored as Argon2id PHC strings (algorithm, parameters, salt
//! and hash in one value), each with a fresh random salt.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

/// Hash a plaintext password with Argon2id and default parameters.
///
/// ```ignore
/// use byteblog::services::password::hash_password;
///
/// let hash = hash_password("hunter22")?;
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        .context("Password hashing failed")?;

    Ok(hash.to_string())
}

/// Check a plaintext password against a stored PHC string.
///
/// A mismatch is `Ok(false)`; only a malformed hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e))
            .context("Password verification error"),
    }
}

/// Length check shared by signup and password change. Counts characters, not bytes.
pub fn is_long_enough(password: &str, min_length: usize) -> bool {
    password.chars().count() >= min_length
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_argon2id_and_salted() {
        let first = hash_password("secret1").expect("Failed to hash password");
        let second = hash_password("secret1").expect("Failed to hash password");

        assert!(first.starts_with("$argon2id$"));
        assert_ne!(first, second);
        assert!(!first.contains("secret1"));
    }

    #[test]
    fn test_verify_roundtrip() {
        let hash = hash_password("correct horse").expect("Failed to hash password");

        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(verify_password("anything", "plaintext-not-a-hash").is_err());
    }

    #[test]
    fn test_unicode_password() {
        let hash = hash_password("pässwörd🔐").expect("Failed to hash password");
        assert!(verify_password("pässwörd🔐", &hash).unwrap());
    }

    #[test]
    fn test_length_counts_chars() {
        assert!(is_long_enough("abcdef", 6));
        assert!(!is_long_enough("abcde", 6));
        // Six characters, more than six bytes
        assert!(is_long_enough("ééééé1", 6));
        assert!(!is_long_enough("", 1));
    }
}
