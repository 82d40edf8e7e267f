use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    error::RepositoryError,
    models::{
        account::{Account, AccountId},
        credential::HashedPassword,
        phone_number::PhoneNumber,
        registration_session::Role,
        step_payloads::{BasicInfo, DriverInfo, MerchantInfo, ResidenceInfo, VehicleInfo},
    },
};

/// Data needed to create a permanent account.
#[derive(Debug, Clone)]
pub struct NewAccount<'a> {
    pub phone_number: &'a PhoneNumber,
    pub role: Role,
    pub basic_info: &'a BasicInfo,
    pub password_hash: &'a HashedPassword,
    pub created_at: DateTime<Utc>,
}

/// Permanent account store, keyed by phone number.
#[async_trait]
pub trait AccountRepository {
    async fn find_by_phone(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<Option<Account>, RepositoryError>;

    /// Stage a new account; a taken phone number fails with `Duplicate`
    /// at flush time.
    async fn create(&self, account: NewAccount<'_>) -> Result<AccountId, RepositoryError>;

    async fn create_merchant(
        &self,
        account_id: &AccountId,
        info: &MerchantInfo,
    ) -> Result<Uuid, RepositoryError>;

    async fn create_driver(
        &self,
        account_id: &AccountId,
        driver: &DriverInfo,
        vehicle: &VehicleInfo,
        residence: &ResidenceInfo,
    ) -> Result<Uuid, RepositoryError>;
}
