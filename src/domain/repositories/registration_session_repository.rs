use async_trait::async_trait;

use crate::domain::{
    error::RepositoryError,
    models::{phone_number::PhoneNumber, registration_session::RegistrationSession},
};

/// Staging store for registrations in progress.
///
/// Writes are staged on the owning unit of work and only reach the database
/// when it flushes or commits.
#[async_trait]
pub trait RegistrationSessionRepository {
    async fn find_by_phone(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<Option<RegistrationSession>, RepositoryError>;

    /// Like `find_by_phone`, but holds the row lock until the transaction
    /// ends so concurrent writers for the same phone queue up.
    async fn find_by_phone_for_update(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<Option<RegistrationSession>, RepositoryError>;

    /// Stage the first row for a phone number; a second active session for
    /// the same number fails with `Duplicate` at flush time.
    async fn insert(&self, session: &RegistrationSession) -> Result<(), RepositoryError>;

    /// Stage the session's pending changes. Fails with `Stale` at flush time
    /// if the row moved past the revision the session was loaded at.
    async fn save(&self, session: &RegistrationSession) -> Result<(), RepositoryError>;

    /// Stage removal of the session, guarded by its revision like `save`.
    async fn delete(&self, session: &RegistrationSession) -> Result<(), RepositoryError>;
}
