use sea_orm::DatabaseConnection;
use tracing::{debug, info, warn};

use crate::{
    domain::{
        error::{DomainError, RepositoryError},
        models::{
            credential::PlainPassword,
            phone_number::PhoneNumber,
            registration_session::{RegistrationSession, Role, WizardStep},
            step_payloads::{BasicInfo, DriverInfo, MerchantInfo, ResidenceInfo, VehicleInfo},
        },
        repositories::{
            account_repository::AccountRepository,
            registration_session_repository::RegistrationSessionRepository,
        },
        services::{otp_service::OtpGate, password_service::PasswordHasher},
    },
    infrastructure::{
        account_store::AccountStore, registration_session_store::RegistrationSessionStore,
        unit_of_work::UnitOfWork,
    },
    usecase::retry::retry_transient_once,
};

/// Drives a staged registration through its steps. Every load, check and
/// save happens inside one transaction that holds the session row locked.
pub struct RegistrationStateMachine<O: OtpGate, P: PasswordHasher> {
    db: DatabaseConnection,
    otp_gate: O,
    password_hasher: P,
}

impl<O: OtpGate, P: PasswordHasher> RegistrationStateMachine<O, P> {
    pub fn new(db: DatabaseConnection, otp_gate: O, password_hasher: P) -> Self {
        Self {
            db,
            otp_gate,
            password_hasher,
        }
    }

    /// Return the session for `phone_number`, creating it on first contact.
    pub async fn start_or_resume(
        &self,
        phone_number: &PhoneNumber,
        role: Role,
    ) -> Result<RegistrationSession, DomainError> {
        let uow = UnitOfWork::new(self.db.clone());
        if let Some(existing) = load(&uow, phone_number).await? {
            return resume(existing, role);
        }

        let session = RegistrationSession::start(phone_number.clone(), role);
        let staged = &session;
        let inserted = uow
            .execute_in_transaction(|uow| async move {
                if AccountStore::new(uow)
                    .find_by_phone(phone_number)
                    .await?
                    .is_some()
                {
                    return Err(DomainError::PhoneAlreadyRegistered);
                }
                RegistrationSessionStore::new(uow).insert(staged).await?;
                Ok(())
            })
            .await;

        match inserted {
            Ok(()) => {
                info!(phone = %phone_number, role = %role, "registration started");
                Ok(session)
            }
            Err(DomainError::Repository(RepositoryError::Duplicate(_))) => {
                debug!(phone = %phone_number, "concurrent start won elsewhere; resuming");
                let existing = load(&uow, phone_number)
                    .await?
                    .ok_or(DomainError::SessionNotFound)?;
                resume(existing, role)
            }
            Err(err) => Err(err),
        }
    }

    /// Send a verification code for an unverified session.
    pub async fn request_verification_code(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<(), DomainError> {
        let session = self.status(phone_number).await?;
        if session.is_phone_verified() {
            debug!(phone = %phone_number, "phone already verified; no code sent");
            return Ok(());
        }
        self.otp_gate.issue(phone_number).await
    }

    /// Check `code` and record the verification. The code is only revoked
    /// once the session write has committed.
    pub async fn verify_phone(
        &self,
        phone_number: &PhoneNumber,
        code: &str,
    ) -> Result<RegistrationSession, DomainError> {
        let session = retry_transient_once("phone verification", || async move {
            let uow = UnitOfWork::new(self.db.clone());
            uow.execute_in_transaction(|uow| async move {
                let store = RegistrationSessionStore::new(uow);
                let mut session = store
                    .find_by_phone_for_update(phone_number)
                    .await?
                    .ok_or(DomainError::SessionNotFound)?;
                if !self.otp_gate.verify(phone_number, code).await? {
                    info!(phone = %phone_number, "verification code rejected");
                    return Err(DomainError::InvalidOrExpiredCode);
                }
                session.mark_phone_verified();
                store.save(&session).await?;
                session.mark_saved();
                Ok(session)
            })
            .await
        })
        .await?;

        if let Err(err) = self.otp_gate.revoke(phone_number).await {
            warn!(phone = %phone_number, error = %err, "verified code could not be revoked");
        }
        info!(phone = %phone_number, "phone verified");
        Ok(session)
    }

    pub async fn set_basic_info(
        &self,
        phone_number: &PhoneNumber,
        info: BasicInfo,
        password: PlainPassword,
    ) -> Result<RegistrationSession, DomainError> {
        let password_hash = self.password_hasher.hash(&password)?;
        self.record_step(phone_number, WizardStep::BasicInfo, |session| {
            session.set_basic_info(info.clone(), password_hash.clone())
        })
        .await
    }

    pub async fn set_merchant_info(
        &self,
        phone_number: &PhoneNumber,
        info: MerchantInfo,
    ) -> Result<RegistrationSession, DomainError> {
        self.record_step(phone_number, WizardStep::MerchantInfo, |session| {
            session.set_merchant_info(info.clone())
        })
        .await
    }

    pub async fn set_driver_info(
        &self,
        phone_number: &PhoneNumber,
        info: DriverInfo,
    ) -> Result<RegistrationSession, DomainError> {
        self.record_step(phone_number, WizardStep::DriverInfo, |session| {
            session.set_driver_info(info.clone())
        })
        .await
    }

    pub async fn set_vehicle_info(
        &self,
        phone_number: &PhoneNumber,
        info: VehicleInfo,
    ) -> Result<RegistrationSession, DomainError> {
        self.record_step(phone_number, WizardStep::VehicleInfo, |session| {
            session.set_vehicle_info(info.clone())
        })
        .await
    }

    pub async fn set_residence_info(
        &self,
        phone_number: &PhoneNumber,
        info: ResidenceInfo,
    ) -> Result<RegistrationSession, DomainError> {
        self.record_step(phone_number, WizardStep::ResidenceInfo, |session| {
            session.set_residence_info(info.clone())
        })
        .await
    }

    /// Current snapshot of the session, for resuming a wizard.
    pub async fn status(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<RegistrationSession, DomainError> {
        let uow = UnitOfWork::new(self.db.clone());
        load(&uow, phone_number)
            .await?
            .ok_or(DomainError::SessionNotFound)
    }

    pub fn is_ready_to_finalize(session: &RegistrationSession) -> bool {
        session.is_ready_to_finalize()
    }

    async fn record_step<F>(
        &self,
        phone_number: &PhoneNumber,
        step: WizardStep,
        apply: F,
    ) -> Result<RegistrationSession, DomainError>
    where
        F: Fn(&mut RegistrationSession) -> Result<(), DomainError> + Send + Sync,
    {
        let session = self.update(phone_number, apply).await?;
        info!(
            phone = %phone_number,
            role = %session.role(),
            step = %step,
            reached = %session.step(),
            "registration step recorded"
        );
        Ok(session)
    }

    /// Lock, mutate and save the session in one transaction. `apply` runs
    /// again on a fresh load if the first attempt hit a transient failure.
    async fn update<F>(
        &self,
        phone_number: &PhoneNumber,
        apply: F,
    ) -> Result<RegistrationSession, DomainError>
    where
        F: Fn(&mut RegistrationSession) -> Result<(), DomainError> + Send + Sync,
    {
        let apply = &apply;
        retry_transient_once("session update", || async move {
            let uow = UnitOfWork::new(self.db.clone());
            uow.execute_in_transaction(|uow| async move {
                let store = RegistrationSessionStore::new(uow);
                let mut session = store
                    .find_by_phone_for_update(phone_number)
                    .await?
                    .ok_or(DomainError::SessionNotFound)?;
                apply(&mut session)?;
                store.save(&session).await?;
                session.mark_saved();
                Ok(session)
            })
            .await
        })
        .await
    }
}

async fn load(
    uow: &UnitOfWork,
    phone_number: &PhoneNumber,
) -> Result<Option<RegistrationSession>, RepositoryError> {
    uow.execute_in_transaction(|uow| async move {
        RegistrationSessionStore::new(uow)
            .find_by_phone(phone_number)
            .await
    })
    .await
}

fn resume(session: RegistrationSession, role: Role) -> Result<RegistrationSession, DomainError> {
    if session.role() != role {
        return Err(DomainError::RoleConflict {
            existing: session.role(),
        });
    }
    debug!(phone = %session.phone_number(), step = %session.step(), "registration resumed");
    Ok(session)
}
