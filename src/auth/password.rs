//! Password hashing (Argon2id) and password policy

use crate::{config::PasswordConfig, error::AppError};
use argon2::{Algorithm, Argon2, Params, Version};
use once_cell::sync::Lazy;
use password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
};
use std::collections::HashSet;

/// Password hasher with configurable parameters
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Default cost: m=19MiB, t=2, p=1
    pub fn new() -> Self {
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::DEFAULT),
        }
    }

    pub fn from_config(config: &PasswordConfig) -> Result<Self, AppError> {
        let params = Params::new(
            config.hash_memory_kib,
            config.hash_iterations,
            config.hash_parallelism,
            None,
        )
        .map_err(|e| AppError::Config(format!("Invalid Argon2 params: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a password with a fresh salt
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!("Failed to hash password: {:?}", e);
                AppError::Internal(format!("Failed to hash password: {}", e))
            })?
            .to_string();

        Ok(password_hash)
    }

    /// Verify a password against a stored hash; mismatch is `Unauthorized`
    pub fn verify(&self, password: &str, hash: &str) -> Result<(), AppError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            tracing::warn!("Failed to parse password hash: {:?}", e);
            AppError::Internal(format!("Failed to parse password hash: {}", e))
        })?;

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AppError::Unauthorized)
    }

    /// Boolean form used for history checks; unparseable hashes never match
    pub fn matches(&self, password: &str, hash: &str) -> bool {
        PasswordHash::new(hash)
            .map(|parsed| self.argon2.verify_password(password.as_bytes(), &parsed).is_ok())
            .unwrap_or(false)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

static COMMON_PASSWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "password",
        "password1",
        "passw0rd",
        "p@ssw0rd",
        "123456",
        "qwerty",
        "admin",
        "welcome",
        "letmein",
    ]
    .into_iter()
    .collect()
});

pub fn is_common_password(password: &str) -> bool {
    COMMON_PASSWORDS.contains(password.to_lowercase().as_str())
}

/// upper, lower, digit, symbol
pub fn is_complex_password(password: &str) -> bool {
    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password
        .chars()
        .any(|c| !c.is_alphanumeric() && !c.is_whitespace());
    has_upper && has_lower && has_digit && has_symbol
}

#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_complexity: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_complexity: true,
        }
    }
}

impl PasswordPolicy {
    pub fn from_config(config: &PasswordConfig) -> Self {
        Self {
            min_length: config.min_length,
            require_complexity: config.require_complexity,
        }
    }

    pub fn validate(&self, password: &str) -> Result<(), AppError> {
        if password.chars().count() < self.min_length {
            return Err(AppError::BadRequest(format!(
                "password must be at least {} characters",
                self.min_length
            )));
        }

        if self.require_complexity && !is_complex_password(password) {
            return Err(AppError::BadRequest(
                "password must include uppercase, lowercase, number, and symbol".to_string(),
            ));
        }

        if is_common_password(password) {
            return Err(AppError::BadRequest("password is too common".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new();
        let password = "TestPassword123!";

        let hash = hasher.hash(password).unwrap();
        assert!(hash.starts_with("$argon2id$"));
        hasher.verify(password, &hash).unwrap();
        assert!(hasher.matches(password, &hash));
    }

    #[test]
    fn test_verify_fails_with_wrong_password() {
        let hasher = PasswordHasher::new();
        let hash = hasher.hash("TestPassword123!").unwrap();

        assert!(matches!(
            hasher.verify("WrongPassword123!", &hash),
            Err(AppError::Unauthorized)
        ));
        assert!(!hasher.matches("WrongPassword123!", &hash));
    }

    #[test]
    fn test_salts_differ() {
        let hasher = PasswordHasher::new();
        assert_ne!(hasher.hash("Same#Pass1").unwrap(), hasher.hash("Same#Pass1").unwrap());
    }

    #[test]
    fn test_garbage_hash_never_matches() {
        let hasher = PasswordHasher::new();
        assert!(!hasher.matches("anything", "not-a-phc-string"));
        assert!(hasher.verify("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_from_config_rejects_bad_params() {
        let config = PasswordConfig {
            min_length: 8,
            require_complexity: true,
            history_size: 5,
            reset_ttl: std::time::Duration::from_secs(1800),
            hash_memory_kib: 1,
            hash_iterations: 2,
            hash_parallelism: 1,
        };
        assert!(PasswordHasher::from_config(&config).is_err());
    }

    #[test]
    fn test_policy() {
        let policy = PasswordPolicy::default();

        assert!(policy.validate("Str0ng!Pass").is_ok());
        assert!(policy.validate("Sh0rt!").is_err());
        assert!(policy.validate("alllowercase1!").is_err());
        assert!(policy.validate("NoDigitsHere!").is_err());
        assert!(policy.validate("NoSymbols123").is_err());
    }

    #[test]
    fn test_policy_without_complexity_still_rejects_common() {
        let policy = PasswordPolicy {
            min_length: 6,
            require_complexity: false,
        };

        assert!(policy.validate("simplepass").is_ok());
        assert!(policy.validate("Password").is_err());
        assert!(policy.validate("LETMEIN").is_err());
        assert!(policy.validate("123456").is_err());
    }

    #[test]
    fn test_common_password_list() {
        assert!(is_common_password("P@ssw0rd"));
        assert!(is_common_password("qwerty"));
        assert!(!is_common_password("Correct#Horse9"));
    }
}
