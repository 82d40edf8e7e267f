use async_trait::async_trait;

use crate::domain::{error::DomainError, models::phone_number::PhoneNumber};

/// Issues and checks one-time verification codes.
#[async_trait]
pub trait OtpGate: Send + Sync {
    /// Issue a fresh code for `phone_number`, replacing any outstanding one.
    async fn issue(&self, phone_number: &PhoneNumber) -> Result<(), DomainError>;

    /// Check `code` without consuming it. Wrong guesses count against the
    /// outstanding code.
    async fn verify(&self, phone_number: &PhoneNumber, code: &str) -> Result<bool, DomainError>;

    /// Discard the outstanding code once its verification has been recorded.
    async fn revoke(&self, phone_number: &PhoneNumber) -> Result<(), DomainError>;
}

/// Delivers an issued code to the phone (SMS in production).
#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, phone_number: &PhoneNumber, code: &str) -> Result<(), DomainError>;
}
