use std::{
    any::type_name,
    future::Future,
    sync::{
        Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, EntityTrait, Statement,
    TransactionTrait,
};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{domain::error::RepositoryError, infrastructure::repository::Repository};

/// What a staged write must touch for the flush to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowExpectation {
    Any,
    /// At least one row, or `NotFound`.
    Exists,
    /// At least one row still matching the write's guard, or `Stale`.
    Current,
}

/// A mutation staged by a repository, executed when the unit of work flushes.
pub(crate) struct PendingWrite {
    entity: &'static str,
    statement: Statement,
    expectation: RowExpectation,
}

impl PendingWrite {
    pub(crate) fn new<E: EntityTrait>(statement: Statement, expectation: RowExpectation) -> Self {
        Self {
            entity: type_name::<E>(),
            statement,
            expectation,
        }
    }
}

/// Transaction scope shared by every repository it hands out.
///
/// Repositories stage their writes here; nothing reaches the database until
/// [`save_changes`](Self::save_changes) or [`commit`](Self::commit). Each
/// commit or rollback closes the current scope, after which repositories
/// obtained inside it fail with [`RepositoryError::ScopeClosed`].
///
/// Dropping a unit of work with an open transaction rolls it back.
pub struct UnitOfWork {
    db: DatabaseConnection,
    transaction: Mutex<Option<DatabaseTransaction>>,
    pending: StdMutex<Vec<PendingWrite>>,
    generation: AtomicU64,
}

impl UnitOfWork {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            transaction: Mutex::new(None),
            pending: StdMutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Repository for `E` bound to this unit of work's transaction.
    pub fn repository<E: EntityTrait>(&self) -> Repository<'_, E> {
        Repository::new(self, self.generation.load(Ordering::SeqCst))
    }

    pub fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    /// Liveness check on the underlying connection, outside any transaction.
    pub async fn can_connect(&self) -> bool {
        match self.db.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "database ping failed");
                false
            }
        }
    }

    pub async fn in_transaction(&self) -> bool {
        self.transaction.lock().await.is_some()
    }

    pub async fn begin_transaction(&self) -> Result<(), RepositoryError> {
        let mut slot = self.transaction.lock().await;
        if slot.is_some() {
            return Err(RepositoryError::TransactionAlreadyActive);
        }
        *slot = Some(self.db.begin().await?);
        debug!("transaction started");
        Ok(())
    }

    /// Flush staged writes into the open transaction without committing.
    /// Returns the number of statements executed.
    pub async fn save_changes(&self) -> Result<usize, RepositoryError> {
        let slot = self.transaction.lock().await;
        let txn = slot.as_ref().ok_or(RepositoryError::NoActiveTransaction)?;
        self.flush(txn).await
    }

    pub async fn commit(&self) -> Result<(), RepositoryError> {
        let txn = self
            .transaction
            .lock()
            .await
            .take()
            .ok_or(RepositoryError::NoActiveTransaction)?;

        let outcome = match self.flush(&txn).await {
            Ok(_) => txn.commit().await.map_err(RepositoryError::from),
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "rollback after failed flush failed");
                }
                Err(err)
            }
        };
        self.close_scope();
        if outcome.is_ok() {
            debug!("transaction committed");
        }
        outcome
    }

    pub async fn rollback(&self) -> Result<(), RepositoryError> {
        let txn = self
            .transaction
            .lock()
            .await
            .take()
            .ok_or(RepositoryError::NoActiveTransaction)?;
        self.close_scope();
        txn.rollback().await?;
        debug!("transaction rolled back");
        Ok(())
    }

    /// Run `operation` atomically.
    ///
    /// Commits when it returns `Ok`, rolls back and returns its error
    /// otherwise. Called while a transaction is already open, the operation
    /// joins that transaction and the outer caller decides the outcome. If
    /// the returned future is dropped before completion the transaction is
    /// rolled back.
    pub async fn execute_in_transaction<'a, F, Fut, T, E>(&'a self, operation: F) -> Result<T, E>
    where
        F: FnOnce(&'a Self) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<RepositoryError>,
    {
        if self.in_transaction().await {
            return operation(self).await;
        }

        self.begin_transaction().await?;
        let _guard = AbandonGuard { uow: self };

        match operation(self).await {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Release the unit of work, rolling back anything left uncommitted.
    pub async fn dispose(self) -> Result<(), RepositoryError> {
        let open = self.transaction.lock().await.take();
        if let Some(txn) = open {
            warn!("unit of work disposed with an open transaction; rolling back");
            self.close_scope();
            txn.rollback().await?;
        }
        Ok(())
    }

    pub(crate) async fn active_transaction(
        &self,
        generation: u64,
    ) -> Result<MappedMutexGuard<'_, DatabaseTransaction>, RepositoryError> {
        self.ensure_current(generation)?;
        let slot = self.transaction.lock().await;
        MutexGuard::try_map(slot, Option::as_mut).map_err(|_| RepositoryError::NoActiveTransaction)
    }

    pub(crate) async fn stage(
        &self,
        generation: u64,
        write: PendingWrite,
    ) -> Result<(), RepositoryError> {
        self.ensure_current(generation)?;
        let slot = self.transaction.lock().await;
        if slot.is_none() {
            return Err(RepositoryError::NoActiveTransaction);
        }
        self.pending_writes().push(write);
        Ok(())
    }

    fn ensure_current(&self, generation: u64) -> Result<(), RepositoryError> {
        if self.generation.load(Ordering::SeqCst) != generation {
            return Err(RepositoryError::ScopeClosed);
        }
        Ok(())
    }

    async fn flush(&self, txn: &DatabaseTransaction) -> Result<usize, RepositoryError> {
        let writes = std::mem::take(&mut *self.pending_writes());
        let count = writes.len();
        for write in writes {
            let result = txn.execute(write.statement).await?;
            if result.rows_affected() > 0 {
                continue;
            }
            match write.expectation {
                RowExpectation::Any => {}
                RowExpectation::Exists => {
                    debug!(entity = write.entity, "staged write matched no row");
                    return Err(RepositoryError::NotFound);
                }
                RowExpectation::Current => {
                    debug!(entity = write.entity, "guarded write found the row changed");
                    return Err(RepositoryError::Stale);
                }
            }
        }
        if count > 0 {
            debug!(statements = count, "flushed staged writes");
        }
        Ok(count)
    }

    fn close_scope(&self) {
        self.pending_writes().clear();
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn pending_writes(&self) -> StdMutexGuard<'_, Vec<PendingWrite>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.transaction.get_mut().is_some() {
            warn!("unit of work dropped with an open transaction; rolling back");
        }
    }
}

/// Rolls back a transaction whose `execute_in_transaction` future was
/// dropped mid-flight.
struct AbandonGuard<'a> {
    uow: &'a UnitOfWork,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        let Ok(mut slot) = self.uow.transaction.try_lock() else {
            return;
        };
        if let Some(txn) = slot.take() {
            warn!("transaction abandoned before completion; rolling back");
            self.uow.close_scope();
            // DatabaseTransaction rolls back on drop
            drop(txn);
        }
    }
}
