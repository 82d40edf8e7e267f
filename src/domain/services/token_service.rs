use crate::domain::{error::DomainError, models::account::Account};

pub type Token = String;

/// Exchanges a finalized account for session credentials.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self, account: &Account) -> Result<Token, DomainError>;
}
