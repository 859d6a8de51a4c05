use std::sync::LazyLock;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use regex::Regex;

use crate::error::{AppError, Result};

// CJK unified ideographs, ASCII letters, digits, underscore; 1-20 chars.
static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\x{4e00}-\x{9fa5}A-Za-z0-9_]{1,20}$").expect("valid regex"));

/// Hash a password with Argon2id and a fresh random salt.
///
/// Returns the PHC string stored in `users.password_hash`.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

/// `Ok(false)` on mismatch; an unparsable stored hash is an error.
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash format: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

pub fn is_valid_username(username: &str) -> bool {
    USERNAME_RE.is_match(username)
}

pub fn validate_username(username: &str) -> Result<()> {
    if is_valid_username(username) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Username must be 1-20 characters of letters, digits, underscore or Chinese".into(),
        ))
    }
}

pub fn validate_password(password: &str, min_len: usize) -> Result<()> {
    if password.chars().count() < min_len {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            min_len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }

    #[test]
    fn usernames() {
        assert!(is_valid_username("alice_01"));
        assert!(is_valid_username("小明"));
        assert!(is_valid_username("a"));
        assert!(!is_valid_username(""));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username("../etc"));
        assert!(!is_valid_username(&"x".repeat(21)));
    }

    #[test]
    fn password_length_counts_chars() {
        assert!(validate_password("abcdef", 6).is_ok());
        assert!(validate_password("abc", 6).is_err());
        assert!(validate_password("密码密码密码", 6).is_ok());
    }
}
