use argon2::{
    Argon2,
    password_hash::{PasswordHasher as Argon2Hasher, SaltString, rand_core::OsRng},
};

use crate::domain::{
    error::DomainError,
    models::credential::{HashedPassword, PlainPassword},
    services::password_service::PasswordHasher,
};

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Clone)]
pub struct Argon2PasswordHasher;

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Argon2PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, plain_password: &PlainPassword) -> Result<HashedPassword, DomainError> {
        // Validate password strength
        if plain_password.expose().chars().count() < MIN_PASSWORD_LENGTH {
            return Err(DomainError::WeakPassword);
        }

        let salt = SaltString::generate(OsRng);
        let hash = Argon2::default()
            .hash_password(plain_password.expose().as_bytes(), &salt)
            .map_err(|e| DomainError::PasswordHashing(e.to_string()))?
            .to_string();

        Ok(HashedPassword::new(hash))
    }
}

#[cfg(test)]
mod tests {
    use argon2::{PasswordHash, PasswordVerifier};

    use super::*;

    #[test]
    fn hashes_are_phc_strings_that_never_echo_the_password() {
        let hasher = Argon2PasswordHasher::new();
        let password = PlainPassword::new("correct horse");

        let hashed = hasher.hash(&password).unwrap();
        assert!(!hashed.as_str().contains("correct horse"));

        let parsed = PasswordHash::new(hashed.as_str()).unwrap();
        assert!(
            Argon2::default()
                .verify_password(b"correct horse", &parsed)
                .is_ok()
        );
        assert!(
            Argon2::default()
                .verify_password(b"wrong horse", &parsed)
                .is_err()
        );
    }

    #[test]
    fn short_passwords_are_weak() {
        let hasher = Argon2PasswordHasher::new();
        assert!(matches!(
            hasher.hash(&PlainPassword::new("short")),
            Err(DomainError::WeakPassword)
        ));
    }
}
