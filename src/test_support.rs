//! Fixtures and fakes shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveValue::Set, ConnectOptions, Database, DatabaseConnection};
use uuid::Uuid;

use crate::{
    domain::{
        error::DomainError,
        models::{
            account::Account,
            credential::{HashedPassword, PlainPassword},
            phone_number::PhoneNumber,
            step_payloads::{BasicInfo, DriverInfo, MerchantInfo, ResidenceInfo, VehicleInfo},
        },
        services::{
            otp_service::OtpGate, password_service::PasswordHasher,
            token_service::{Token, TokenGenerator},
        },
    },
    infrastructure::schema::create_schema,
};
use entity::{accounts, merchants};

pub const VALID_CODE: &str = "123456";

/// Fresh in-memory SQLite database with the schema applied. A single pooled
/// connection keeps every handle on the same in-memory database.
pub async fn memory_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    create_schema(&db).await.unwrap();
    db
}

pub fn account_model(phone: &str) -> accounts::ActiveModel {
    accounts::ActiveModel {
        id: Set(Uuid::new_v4()),
        phone_number: Set(phone.to_string()),
        full_name: Set("Existing Person".to_string()),
        national_id: Set("X0000000".to_string()),
        national_id_front_url: Set("https://blobs.example.com/id/front.jpg".to_string()),
        national_id_back_url: Set("https://blobs.example.com/id/back.jpg".to_string()),
        password_hash: Set("hash".to_string()),
        role: Set("merchant".to_string()),
        created_at: Set(Utc::now().fixed_offset()),
    }
}

pub fn merchant_model(account_id: Uuid) -> merchants::ActiveModel {
    merchants::ActiveModel {
        id: Set(Uuid::new_v4()),
        account_id: Set(account_id),
        store_name: Set("Corner Shop".to_string()),
        store_category: Set("grocery".to_string()),
        store_address: Set("1 Main St".to_string()),
        store_photo_url: Set(None),
        created_at: Set(Utc::now().fixed_offset()),
    }
}

pub fn basic_info() -> BasicInfo {
    BasicInfo {
        full_name: "Jane Doe".to_string(),
        national_id: "A1234567".to_string(),
        national_id_front_url: "https://blobs.example.com/id/jane-front.jpg".to_string(),
        national_id_back_url: "https://blobs.example.com/id/jane-back.jpg".to_string(),
    }
}

pub fn merchant_info() -> MerchantInfo {
    MerchantInfo {
        store_name: "Jane's Bakery".to_string(),
        store_category: "bakery".to_string(),
        store_address: "12 Baker St".to_string(),
        store_photo_url: Some("https://blobs.example.com/store/bakery.jpg".to_string()),
    }
}

pub fn driver_info() -> DriverInfo {
    DriverInfo {
        license_number: "DL-998877".to_string(),
        license_expiry: NaiveDate::from_ymd_opt(2030, 6, 30).unwrap(),
        license_photo_url: "https://blobs.example.com/license/jane.jpg".to_string(),
    }
}

pub fn vehicle_info() -> VehicleInfo {
    VehicleInfo {
        plate_number: "7ABC123".to_string(),
        make: "Toyota".to_string(),
        model: "Corolla".to_string(),
        color: "white".to_string(),
        year: 2021,
        vehicle_photo_url: "https://blobs.example.com/vehicle/corolla.jpg".to_string(),
    }
}

pub fn residence_info() -> ResidenceInfo {
    ResidenceInfo {
        city: "Springfield".to_string(),
        district: "Downtown".to_string(),
        street_address: "742 Evergreen Terrace".to_string(),
        postal_code: Some("49007".to_string()),
    }
}

/// Accepts only [`VALID_CODE`].
#[derive(Default)]
pub struct FixedOtpGate {
    pub issued: AtomicUsize,
    pub revoked: AtomicUsize,
}

#[async_trait]
impl OtpGate for FixedOtpGate {
    async fn issue(&self, _phone_number: &PhoneNumber) -> Result<(), DomainError> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn verify(&self, _phone_number: &PhoneNumber, code: &str) -> Result<bool, DomainError> {
        Ok(code == VALID_CODE)
    }

    async fn revoke(&self, _phone_number: &PhoneNumber) -> Result<(), DomainError> {
        self.revoked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MockPasswordHasher;

impl PasswordHasher for MockPasswordHasher {
    fn hash(&self, plain_password: &PlainPassword) -> Result<HashedPassword, DomainError> {
        if plain_password.expose().len() < 8 {
            return Err(DomainError::WeakPassword);
        }
        Ok(HashedPassword::new(format!("mock:{}", plain_password.expose().len())))
    }
}

#[derive(Clone)]
pub struct MockTokenGenerator;

impl TokenGenerator for MockTokenGenerator {
    fn generate(&self, _account: &Account) -> Result<Token, DomainError> {
        Ok("mock_token".to_string())
    }
}
