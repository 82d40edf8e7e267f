use thiserror::Error;

use crate::domain::models::registration_session::{Role, WizardStep};

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid phone number")]
    InvalidPhoneNumber,

    #[error("Weak password (minimum 8 characters required)")]
    WeakPassword,

    #[error("No registration in progress for this phone number")]
    SessionNotFound,

    #[error("Step {step} requires {missing} to be completed first")]
    StepOutOfOrder { step: WizardStep, missing: WizardStep },

    #[error("Step {step} does not apply to a {role} registration")]
    RoleMismatch { step: WizardStep, role: Role },

    #[error("Registration already started as {existing}")]
    RoleConflict { existing: Role },

    #[error("Phone number has not been verified")]
    PhoneNotVerified,

    #[error("Verification code is invalid or expired")]
    InvalidOrExpiredCode,

    #[error("Registration is incomplete")]
    RegistrationIncomplete,

    #[error("Phone number is already registered")]
    PhoneAlreadyRegistered,

    #[error("Store temporarily unavailable: {0}")]
    TransientStoreFailure(String),

    #[error("Failed to hash password: {0}")]
    PasswordHashing(String),

    #[error("Failed to issue token: {0}")]
    TokenGeneration(String),

    #[error("Verification code could not be issued: {0}")]
    OtpUnavailable(String),
}

impl DomainError {
    /// Stable machine-readable code returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::ValidationFailed(_) => "VALIDATION_FAILED",
            DomainError::InvalidPhoneNumber => "INVALID_PHONE_NUMBER",
            DomainError::WeakPassword => "WEAK_PASSWORD",
            DomainError::SessionNotFound => "SESSION_NOT_FOUND",
            DomainError::StepOutOfOrder { .. } => "STEP_OUT_OF_ORDER",
            DomainError::RoleMismatch { .. } => "ROLE_MISMATCH",
            DomainError::RoleConflict { .. } => "ROLE_CONFLICT",
            DomainError::PhoneNotVerified => "PHONE_NOT_VERIFIED",
            DomainError::InvalidOrExpiredCode => "INVALID_OR_EXPIRED_CODE",
            DomainError::RegistrationIncomplete => "REGISTRATION_INCOMPLETE",
            DomainError::PhoneAlreadyRegistered => "PHONE_ALREADY_REGISTERED",
            DomainError::TransientStoreFailure(_) => "TRANSIENT_STORE_FAILURE",
            DomainError::Repository(_)
            | DomainError::PasswordHashing(_)
            | DomainError::TokenGeneration(_)
            | DomainError::OtpUnavailable(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::TransientStoreFailure(_))
    }
}

impl From<RepositoryError> for DomainError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Transient(msg) => DomainError::TransientStoreFailure(msg),
            RepositoryError::Stale => {
                DomainError::TransientStoreFailure("record changed concurrently".to_string())
            }
            other => DomainError::Repository(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Not found")]
    NotFound,

    #[error("Duplicate value: {0}")]
    Duplicate(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("A transaction is already active")]
    TransactionAlreadyActive,

    #[error("Record changed since it was read")]
    Stale,

    #[error("Unit of work scope already closed")]
    ScopeClosed,

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
