use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::Set, ColumnTrait, Condition};
use uuid::Uuid;

use crate::{
    domain::{
        error::RepositoryError,
        models::{
            account::{Account, AccountId},
            phone_number::PhoneNumber,
            step_payloads::{DriverInfo, MerchantInfo, ResidenceInfo, VehicleInfo},
        },
        repositories::account_repository::{AccountRepository, NewAccount},
    },
    infrastructure::{
        repository::{QuerySpec, Repository},
        unit_of_work::UnitOfWork,
    },
};
use entity::{accounts, drivers, merchants};

pub struct AccountStore<'u> {
    accounts: Repository<'u, accounts::Entity>,
    merchants: Repository<'u, merchants::Entity>,
    drivers: Repository<'u, drivers::Entity>,
}

impl<'u> AccountStore<'u> {
    pub fn new(uow: &'u UnitOfWork) -> Self {
        Self {
            accounts: uow.repository(),
            merchants: uow.repository(),
            drivers: uow.repository(),
        }
    }

    /// Account row together with its merchant profile, fetched in one query.
    pub async fn find_with_merchant(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<Option<(accounts::Model, Option<merchants::Model>)>, RepositoryError> {
        let page = self
            .accounts
            .find_page_with::<merchants::Entity>(QuerySpec::new(by_phone(phone_number)))
            .await?;
        Ok(page.items.into_iter().next())
    }

    /// Account row together with its driver profile, fetched in one query.
    pub async fn find_with_driver(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<Option<(accounts::Model, Option<drivers::Model>)>, RepositoryError> {
        let page = self
            .accounts
            .find_page_with::<drivers::Entity>(QuerySpec::new(by_phone(phone_number)))
            .await?;
        Ok(page.items.into_iter().next())
    }
}

fn by_phone(phone_number: &PhoneNumber) -> Condition {
    Condition::all().add(accounts::Column::PhoneNumber.eq(phone_number.as_str()))
}

fn account_from_row(row: accounts::Model) -> Result<Account, RepositoryError> {
    let phone_number =
        PhoneNumber::new(row.phone_number).map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
    let role = row.role.parse().map_err(RepositoryError::Corrupt)?;
    Ok(Account::new(
        AccountId::from_uuid(row.id),
        phone_number,
        row.full_name,
        role,
        DateTime::<Utc>::from(row.created_at),
    ))
}

#[async_trait]
impl AccountRepository for AccountStore<'_> {
    async fn find_by_phone(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<Option<Account>, RepositoryError> {
        self.accounts
            .first(by_phone(phone_number))
            .await?
            .map(account_from_row)
            .transpose()
    }

    async fn create(&self, account: NewAccount<'_>) -> Result<AccountId, RepositoryError> {
        let id = AccountId::new();
        let model = accounts::ActiveModel {
            id: Set(*id.as_uuid()),
            phone_number: Set(account.phone_number.as_str().to_string()),
            full_name: Set(account.basic_info.full_name.clone()),
            national_id: Set(account.basic_info.national_id.clone()),
            national_id_front_url: Set(account.basic_info.national_id_front_url.clone()),
            national_id_back_url: Set(account.basic_info.national_id_back_url.clone()),
            password_hash: Set(account.password_hash.as_str().to_string()),
            role: Set(account.role.as_str().to_string()),
            created_at: Set(account.created_at.fixed_offset()),
        };
        self.accounts.add(model).await?;
        Ok(id)
    }

    async fn create_merchant(
        &self,
        account_id: &AccountId,
        info: &MerchantInfo,
    ) -> Result<Uuid, RepositoryError> {
        let id = Uuid::new_v4();
        let model = merchants::ActiveModel {
            id: Set(id),
            account_id: Set(*account_id.as_uuid()),
            store_name: Set(info.store_name.clone()),
            store_category: Set(info.store_category.clone()),
            store_address: Set(info.store_address.clone()),
            store_photo_url: Set(info.store_photo_url.clone()),
            created_at: Set(Utc::now().fixed_offset()),
        };
        self.merchants.add(model).await?;
        Ok(id)
    }

    async fn create_driver(
        &self,
        account_id: &AccountId,
        driver: &DriverInfo,
        vehicle: &VehicleInfo,
        residence: &ResidenceInfo,
    ) -> Result<Uuid, RepositoryError> {
        let id = Uuid::new_v4();
        let model = drivers::ActiveModel {
            id: Set(id),
            account_id: Set(*account_id.as_uuid()),
            license_number: Set(driver.license_number.clone()),
            license_expiry: Set(driver.license_expiry),
            license_photo_url: Set(driver.license_photo_url.clone()),
            plate_number: Set(vehicle.plate_number.clone()),
            vehicle_make: Set(vehicle.make.clone()),
            vehicle_model: Set(vehicle.model.clone()),
            vehicle_color: Set(vehicle.color.clone()),
            vehicle_year: Set(vehicle.year),
            vehicle_photo_url: Set(vehicle.vehicle_photo_url.clone()),
            city: Set(residence.city.clone()),
            district: Set(residence.district.clone()),
            street_address: Set(residence.street_address.clone()),
            postal_code: Set(residence.postal_code.clone()),
            created_at: Set(Utc::now().fixed_offset()),
        };
        self.drivers.add(model).await?;
        Ok(id)
    }
}
