use crate::domain::{
    error::DomainError,
    models::credential::{HashedPassword, PlainPassword},
};

/// Service for hashing passwords before they are stored
pub trait PasswordHasher: Send + Sync {
    /// Hash a plain text password, rejecting ones below the strength policy
    fn hash(&self, plain_password: &PlainPassword) -> Result<HashedPassword, DomainError>;
}
