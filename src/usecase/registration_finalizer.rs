use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    domain::{
        error::{DomainError, RepositoryError},
        models::{
            account::Account,
            phone_number::PhoneNumber,
            registration_session::{RegistrationSession, Role},
        },
        repositories::{
            account_repository::{AccountRepository, NewAccount},
            registration_session_repository::RegistrationSessionRepository,
        },
        services::token_service::{Token, TokenGenerator},
    },
    infrastructure::{
        account_store::AccountStore, registration_session_store::RegistrationSessionStore,
        unit_of_work::UnitOfWork,
    },
    usecase::retry::retry_transient_once,
};

/// Account and role record created from a finished session.
#[derive(Debug, Clone)]
pub struct FinalizedRegistration {
    pub account: Account,
    pub profile_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResult {
    pub token: Token,
    pub account: Account,
}

/// Turns a completed session into permanent records in one transaction.
pub struct RegistrationFinalizer<T: TokenGenerator> {
    db: DatabaseConnection,
    token_generator: T,
}

impl<T: TokenGenerator> RegistrationFinalizer<T> {
    pub fn new(db: DatabaseConnection, token_generator: T) -> Self {
        Self {
            db,
            token_generator,
        }
    }

    /// Finalize and issue a token for the new account. The token is only
    /// issued once the records are committed.
    pub async fn complete(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<RegistrationResult, DomainError> {
        let finalized = self.finalize(phone_number).await?;
        let token = self.token_generator.generate(&finalized.account)?;
        Ok(RegistrationResult {
            token,
            account: finalized.account,
        })
    }

    /// Create the account and its role record, then delete the session.
    /// A transient store failure is retried once.
    pub async fn finalize(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<FinalizedRegistration, DomainError> {
        retry_transient_once("finalization", || self.finalize_once(phone_number)).await
    }

    async fn finalize_once(
        &self,
        phone_number: &PhoneNumber,
    ) -> Result<FinalizedRegistration, DomainError> {
        let uow = UnitOfWork::new(self.db.clone());
        let outcome = uow
            .execute_in_transaction(|uow| async move {
                let sessions = RegistrationSessionStore::new(uow);
                let accounts = AccountStore::new(uow);

                let Some(session) = sessions.find_by_phone_for_update(phone_number).await? else {
                    if accounts.find_by_phone(phone_number).await?.is_some() {
                        return Err(DomainError::PhoneAlreadyRegistered);
                    }
                    return Err(DomainError::SessionNotFound);
                };

                if !session.is_ready_to_finalize() {
                    return Err(DomainError::RegistrationIncomplete);
                }
                if accounts.find_by_phone(phone_number).await?.is_some() {
                    return Err(DomainError::PhoneAlreadyRegistered);
                }

                persist(uow, &session).await
            })
            .await;

        match outcome {
            Ok(finalized) => {
                info!(
                    phone = %phone_number,
                    role = %finalized.account.role(),
                    account_id = %finalized.account.id().as_uuid(),
                    "registration finalized"
                );
                Ok(finalized)
            }
            // another finalization committed the same phone number first
            Err(DomainError::Repository(RepositoryError::Duplicate(_))) => {
                Err(DomainError::PhoneAlreadyRegistered)
            }
            Err(err) => Err(err),
        }
    }
}

/// Stage the account, its role record and the session deletion. Nothing is
/// written unless the whole set flushes, and the deletion only matches the
/// session revision that was read.
async fn persist(
    uow: &UnitOfWork,
    session: &RegistrationSession,
) -> Result<FinalizedRegistration, DomainError> {
    let sessions = RegistrationSessionStore::new(uow);
    let accounts = AccountStore::new(uow);
    let phone_number = session.phone_number();

    let (Some(basic_info), Some(password_hash)) = (session.basic_info(), session.password_hash())
    else {
        return Err(DomainError::RegistrationIncomplete);
    };

    let created_at = Utc::now();
    let account_id = accounts
        .create(NewAccount {
            phone_number,
            role: session.role(),
            basic_info,
            password_hash,
            created_at,
        })
        .await?;

    let profile_id = match session.role() {
        Role::Merchant => {
            let info = session
                .merchant_info()
                .ok_or(DomainError::RegistrationIncomplete)?;
            accounts.create_merchant(&account_id, info).await?
        }
        Role::Driver => {
            let (Some(driver), Some(vehicle), Some(residence)) = (
                session.driver_info(),
                session.vehicle_info(),
                session.residence_info(),
            ) else {
                return Err(DomainError::RegistrationIncomplete);
            };
            accounts
                .create_driver(&account_id, driver, vehicle, residence)
                .await?
        }
    };

    sessions.delete(session).await?;

    Ok(FinalizedRegistration {
        account: Account::new(
            account_id,
            phone_number.clone(),
            basic_info.full_name.clone(),
            session.role(),
            created_at,
        ),
        profile_id,
    })
}

#[cfg(test)]
mod tests {
    use entity::{accounts, drivers, merchants, registration_sessions};
    use rstest::{fixture, rstest};
    use sea_orm::{ColumnTrait, Condition, EntityTrait};

    use super::*;
    use crate::{
        domain::models::credential::PlainPassword,
        test_support::{
            FixedOtpGate, MockPasswordHasher, MockTokenGenerator, VALID_CODE, account_model,
            basic_info, driver_info, memory_db, merchant_info, residence_info, vehicle_info,
        },
        usecase::registration_state_machine::RegistrationStateMachine,
    };

    struct Harness {
        db: DatabaseConnection,
        machine: RegistrationStateMachine<FixedOtpGate, MockPasswordHasher>,
        finalizer: RegistrationFinalizer<MockTokenGenerator>,
    }

    #[fixture]
    async fn harness() -> Harness {
        let db = memory_db().await;
        Harness {
            machine: RegistrationStateMachine::new(
                db.clone(),
                FixedOtpGate::default(),
                MockPasswordHasher,
            ),
            finalizer: RegistrationFinalizer::new(db.clone(), MockTokenGenerator),
            db,
        }
    }

    fn phone() -> PhoneNumber {
        PhoneNumber::new("+15551234567").unwrap()
    }

    async fn count<E>(db: &DatabaseConnection, condition: Condition) -> u64
    where
        E: EntityTrait,
        E::Model: Send + Sync + 'static,
    {
        let uow = UnitOfWork::new(db.clone());
        uow.execute_in_transaction(|uow| async move {
            uow.repository::<E>().count(condition).await
        })
        .await
        .unwrap()
    }

    async fn session_count(db: &DatabaseConnection) -> u64 {
        count::<registration_sessions::Entity>(
            db,
            Condition::all()
                .add(registration_sessions::Column::PhoneNumber.eq(phone().as_str())),
        )
        .await
    }

    async fn account_count(db: &DatabaseConnection) -> u64 {
        count::<accounts::Entity>(
            db,
            Condition::all().add(accounts::Column::PhoneNumber.eq(phone().as_str())),
        )
        .await
    }

    async fn completed_driver(harness: &Harness) {
        let machine = &harness.machine;
        let phone = phone();
        machine.start_or_resume(&phone, Role::Driver).await.unwrap();
        machine.verify_phone(&phone, VALID_CODE).await.unwrap();
        machine
            .set_basic_info(&phone, basic_info(), PlainPassword::new("correct horse"))
            .await
            .unwrap();
        machine.set_driver_info(&phone, driver_info()).await.unwrap();
        machine
            .set_vehicle_info(&phone, vehicle_info())
            .await
            .unwrap();
        machine
            .set_residence_info(&phone, residence_info())
            .await
            .unwrap();
    }

    #[rstest]
    #[tokio::test]
    async fn driver_registration_becomes_an_account(#[future] harness: Harness) {
        let harness = harness.await;
        completed_driver(&harness).await;

        let result = harness.finalizer.complete(&phone()).await.unwrap();
        assert_eq!(result.token, "mock_token");
        assert_eq!(result.account.role(), Role::Driver);
        assert_eq!(result.account.full_name(), "Jane Doe");

        assert_eq!(account_count(&harness.db).await, 1);
        assert_eq!(session_count(&harness.db).await, 0);

        let uow = UnitOfWork::new(harness.db.clone());
        let (account, driver) = uow
            .execute_in_transaction(|uow| async move {
                AccountStore::new(uow).find_with_driver(&phone()).await
            })
            .await
            .unwrap()
            .unwrap();
        let driver = driver.unwrap();
        assert_eq!(driver.account_id, account.id);
        assert_eq!(driver.plate_number, "7ABC123");
        assert_eq!(account.password_hash, "mock:13");
        assert_eq!(count::<drivers::Entity>(&harness.db, Condition::all()).await, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn merchant_registration_becomes_an_account(#[future] harness: Harness) {
        let harness = harness.await;
        let machine = &harness.machine;
        let phone = phone();
        machine.start_or_resume(&phone, Role::Merchant).await.unwrap();
        machine.verify_phone(&phone, VALID_CODE).await.unwrap();
        machine
            .set_basic_info(&phone, basic_info(), PlainPassword::new("correct horse"))
            .await
            .unwrap();
        machine
            .set_merchant_info(&phone, merchant_info())
            .await
            .unwrap();

        let finalized = harness.finalizer.finalize(&phone).await.unwrap();

        let uow = UnitOfWork::new(harness.db.clone());
        let (_, merchant) = uow
            .execute_in_transaction(|uow| async move {
                AccountStore::new(uow).find_with_merchant(&phone).await
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(merchant.unwrap().id, finalized.profile_id);
        assert_eq!(count::<merchants::Entity>(&harness.db, Condition::all()).await, 1);
        assert_eq!(count::<drivers::Entity>(&harness.db, Condition::all()).await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn incomplete_sessions_are_not_finalized(#[future] harness: Harness) {
        let harness = harness.await;
        let machine = &harness.machine;
        let phone = phone();
        machine.start_or_resume(&phone, Role::Driver).await.unwrap();
        machine.verify_phone(&phone, VALID_CODE).await.unwrap();
        machine
            .set_basic_info(&phone, basic_info(), PlainPassword::new("correct horse"))
            .await
            .unwrap();

        let err = harness.finalizer.finalize(&phone).await.unwrap_err();
        assert!(matches!(err, DomainError::RegistrationIncomplete));
        assert_eq!(session_count(&harness.db).await, 1);
        assert_eq!(account_count(&harness.db).await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn racing_finalizations_create_one_account(#[future] harness: Harness) {
        let harness = harness.await;
        completed_driver(&harness).await;
        let phone = phone();

        let (a, b) = tokio::join!(
            harness.finalizer.finalize(&phone),
            harness.finalizer.finalize(&phone)
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|o| matches!(
            o,
            Err(DomainError::PhoneAlreadyRegistered)
        )));
        assert_eq!(account_count(&harness.db).await, 1);
        assert_eq!(session_count(&harness.db).await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn taken_phone_number_keeps_the_session(#[future] harness: Harness) {
        let harness = harness.await;
        completed_driver(&harness).await;
        accounts::Entity::insert(account_model(phone().as_str()))
            .exec(&harness.db)
            .await
            .unwrap();

        let err = harness.finalizer.complete(&phone()).await.unwrap_err();
        assert!(matches!(err, DomainError::PhoneAlreadyRegistered));
        assert_eq!(session_count(&harness.db).await, 1);
        assert_eq!(count::<drivers::Entity>(&harness.db, Condition::all()).await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn failed_flush_after_staging_the_account_leaves_nothing(#[future] harness: Harness) {
        let harness = harness.await;
        completed_driver(&harness).await;
        let phone = phone();

        let stale = harness.machine.status(&phone).await.unwrap();
        // a later edit moves the row past the revision `stale` was read at
        harness
            .machine
            .set_vehicle_info(&phone, vehicle_info())
            .await
            .unwrap();

        let uow = UnitOfWork::new(harness.db.clone());
        let stale = &stale;
        let err = uow
            .execute_in_transaction(|uow| async move { persist(uow, stale).await })
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(account_count(&harness.db).await, 0);
        assert_eq!(count::<drivers::Entity>(&harness.db, Condition::all()).await, 0);
        assert_eq!(session_count(&harness.db).await, 1);

        // a fresh attempt reads the current revision and goes through
        harness.finalizer.finalize(&phone).await.unwrap();
        assert_eq!(account_count(&harness.db).await, 1);
        assert_eq!(session_count(&harness.db).await, 0);
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_phone_has_nothing_to_finalize(#[future] harness: Harness) {
        let harness = harness.await;
        let err = harness.finalizer.finalize(&phone()).await.unwrap_err();
        assert!(matches!(err, DomainError::SessionNotFound));
    }
}
