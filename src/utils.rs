use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

use crate::errors::AppError;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Outcome of checking a secret against a stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretCheck {
    Valid,
    /// Matched a legacy plain-text credential that should be re-hashed.
    ValidLegacy,
    Invalid,
}

impl SecretCheck {
    pub fn is_valid(self) -> bool {
        !matches!(self, SecretCheck::Invalid)
    }
}

/// Hashes a new password, enforcing the minimum length policy.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    hash_secret(password)
}

/// Hashes any secret without policy checks. Used to migrate legacy credentials.
pub fn hash_secret(secret: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AppError::internal(format!("failed to hash password: {err}")))
}

/// Verifies `secret` against `stored`, which is either a PHC argon2 string or
/// a legacy plain-text value.
pub fn verify_secret(secret: &str, stored: &str) -> SecretCheck {
    match PasswordHash::new(stored) {
        Ok(parsed) => {
            if Argon2::default().verify_password(secret.as_bytes(), &parsed).is_ok() {
                SecretCheck::Valid
            } else {
                SecretCheck::Invalid
            }
        }
        Err(_) => {
            // compare fixed-length digests rather than the raw strings
            let matches = !stored.is_empty() && Sha256::digest(secret.as_bytes()) == Sha256::digest(stored.as_bytes());
            if matches {
                SecretCheck::ValidLegacy
            } else {
                SecretCheck::Invalid
            }
        }
    }
}

/// Identifiers (emails) are matched case-insensitively.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}
