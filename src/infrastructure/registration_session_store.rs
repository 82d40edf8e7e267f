use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::Set, ColumnTrait, Condition};

use crate::{
    domain::{
        error::RepositoryError,
        models::{
            credential::HashedPassword,
            phone_number::PhoneNumber,
            registration_session::{RegistrationSession, SessionChange, SessionRecord, WizardStep},
            step_payloads::{self, StepPayload},
        },
        repositories::registration_session_repository::RegistrationSessionRepository,
    },
    infrastructure::{repository::Repository, unit_of_work::UnitOfWork},
};
use entity::registration_sessions;

/// Session storage on top of the generic repository.
pub struct RegistrationSessionStore<'u> {
    sessions: Repository<'u, registration_sessions::Entity>,
}

impl<'u> RegistrationSessionStore<'u> {
    pub fn new(uow: &'u UnitOfWork) -> Self {
        Self {
            sessions: uow.repository(),
        }
    }
}

#[async_trait]
impl RegistrationSessionRepository for RegistrationSessionStore<'_> {
    async fn find_by_phone(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<Option<RegistrationSession>, RepositoryError> {
        let row = self.sessions.first(by_phone(phone_number)).await?;
        row.map(session_from_row).transpose()
    }

    async fn find_by_phone_for_update(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<Option<RegistrationSession>, RepositoryError> {
        let row = self
            .sessions
            .first_for_update(by_phone(phone_number))
            .await?;
        row.map(session_from_row).transpose()
    }

    async fn insert(&self, session: &RegistrationSession) -> Result<(), RepositoryError> {
        let model = registration_sessions::ActiveModel {
            id: Set(session.id()),
            phone_number: Set(session.phone_number().as_str().to_string()),
            is_phone_verified: Set(session.is_phone_verified()),
            role: Set(session.role().as_str().to_string()),
            basic_info: Set(encode_optional(session.basic_info())?),
            merchant_info: Set(encode_optional(session.merchant_info())?),
            driver_info: Set(encode_optional(session.driver_info())?),
            vehicle_info: Set(encode_optional(session.vehicle_info())?),
            residence_info: Set(encode_optional(session.residence_info())?),
            password_hash: Set(session.password_hash().map(|h| h.as_str().to_string())),
            step: Set(session.step().as_str().to_string()),
            revision: Set(session.revision()),
            created_at: Set(session.created_at().fixed_offset()),
            updated_at: Set(session.updated_at().fixed_offset()),
        };
        self.sessions.add(model).await
    }

    async fn save(&self, session: &RegistrationSession) -> Result<(), RepositoryError> {
        let model = changed_columns(session)?;
        self.sessions
            .update_where(model, at_loaded_revision(session))
            .await
    }

    async fn delete(&self, session: &RegistrationSession) -> Result<(), RepositoryError> {
        self.sessions.remove_where(at_loaded_revision(session)).await
    }
}

fn by_phone(phone_number: &PhoneNumber) -> Condition {
    Condition::all().add(registration_sessions::Column::PhoneNumber.eq(phone_number.as_str()))
}

fn at_loaded_revision(session: &RegistrationSession) -> Condition {
    Condition::all()
        .add(registration_sessions::Column::Id.eq(session.id()))
        .add(registration_sessions::Column::Revision.eq(session.revision()))
}

/// Columns touched by the session's pending changes, plus the bookkeeping
/// every write carries. Identity, phone number and role never change.
fn changed_columns(
    session: &RegistrationSession,
) -> Result<registration_sessions::ActiveModel, RepositoryError> {
    let mut model = registration_sessions::ActiveModel {
        step: Set(session.step().as_str().to_string()),
        revision: Set(session.revision() + 1),
        updated_at: Set(session.updated_at().fixed_offset()),
        ..Default::default()
    };
    for change in session.changes() {
        match change {
            SessionChange::PhoneVerified => {
                model.is_phone_verified = Set(session.is_phone_verified());
            }
            SessionChange::Payload(WizardStep::BasicInfo) => {
                model.basic_info = Set(encode_optional(session.basic_info())?);
                model.password_hash =
                    Set(session.password_hash().map(|h| h.as_str().to_string()));
            }
            SessionChange::Payload(WizardStep::MerchantInfo) => {
                model.merchant_info = Set(encode_optional(session.merchant_info())?);
            }
            SessionChange::Payload(WizardStep::DriverInfo) => {
                model.driver_info = Set(encode_optional(session.driver_info())?);
            }
            SessionChange::Payload(WizardStep::VehicleInfo) => {
                model.vehicle_info = Set(encode_optional(session.vehicle_info())?);
            }
            SessionChange::Payload(WizardStep::ResidenceInfo) => {
                model.residence_info = Set(encode_optional(session.residence_info())?);
            }
        }
    }
    Ok(model)
}

fn encode_optional<T: StepPayload>(payload: Option<&T>) -> Result<Option<String>, RepositoryError> {
    payload
        .map(step_payloads::encode)
        .transpose()
        .map_err(|e| RepositoryError::Corrupt(e.to_string()))
}

fn decode_optional<T: StepPayload>(raw: Option<String>) -> Result<Option<T>, RepositoryError> {
    raw.as_deref()
        .map(step_payloads::decode)
        .transpose()
        .map_err(|e| RepositoryError::Corrupt(e.to_string()))
}

fn session_from_row(
    row: registration_sessions::Model,
) -> Result<RegistrationSession, RepositoryError> {
    let phone_number =
        PhoneNumber::new(row.phone_number).map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
    let role = row.role.parse().map_err(RepositoryError::Corrupt)?;
    let step = row.step.parse().map_err(RepositoryError::Corrupt)?;

    let record = SessionRecord {
        id: row.id,
        phone_number,
        is_phone_verified: row.is_phone_verified,
        role,
        basic_info: decode_optional(row.basic_info)?,
        merchant_info: decode_optional(row.merchant_info)?,
        driver_info: decode_optional(row.driver_info)?,
        vehicle_info: decode_optional(row.vehicle_info)?,
        residence_info: decode_optional(row.residence_info)?,
        password_hash: row.password_hash.map(HashedPassword::new),
        step,
        revision: row.revision,
        created_at: DateTime::<Utc>::from(row.created_at),
        updated_at: DateTime::<Utc>::from(row.updated_at),
    };
    RegistrationSession::reconstruct(record).map_err(RepositoryError::Corrupt)
}
