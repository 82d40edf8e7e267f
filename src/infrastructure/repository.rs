use std::marker::PhantomData;

use sea_orm::{
    ActiveModelTrait, Condition, DbErr, EntityTrait, Order, PaginatorTrait, PrimaryKeyTrait,
    QueryFilter, QueryOrder, QuerySelect, QueryTrait, Related, RuntimeErr, SqlErr, Statement,
    Value, sqlx,
};

use crate::{
    domain::error::RepositoryError,
    infrastructure::unit_of_work::{PendingWrite, RowExpectation, UnitOfWork},
};

/// Filter, ordering and paging for repository queries.
pub struct QuerySpec<E: EntityTrait> {
    condition: Condition,
    order: Vec<(E::Column, Order)>,
    page: Option<(u64, u64)>,
}

impl<E: EntityTrait> QuerySpec<E> {
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            order: Vec::new(),
            page: None,
        }
    }

    pub fn all() -> Self {
        Self::new(Condition::all())
    }

    pub fn order_by_asc(mut self, column: E::Column) -> Self {
        self.order.push((column, Order::Asc));
        self
    }

    pub fn order_by_desc(mut self, column: E::Column) -> Self {
        self.order.push((column, Order::Desc));
        self
    }

    /// Zero-based page index; a zero page size is treated as one.
    pub fn page(mut self, index: u64, size: u64) -> Self {
        self.page = Some((index, size.max(1)));
        self
    }

    fn apply<S>(self, select: S) -> (S, Option<(u64, u64)>)
    where
        S: QueryFilter + QueryOrder,
    {
        let mut select = select.filter(self.condition);
        for (column, order) in self.order {
            select = select.order_by(column, order);
        }
        (select, self.page)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_index: u64,
    pub page_size: u64,
    pub total_items: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    fn unpaged(items: Vec<T>) -> Self {
        let total = items.len() as u64;
        Self {
            items,
            page_index: 0,
            page_size: total,
            total_items: total,
            total_pages: u64::from(total > 0),
        }
    }
}

/// Typed access to one entity table inside a [`UnitOfWork`].
///
/// Reads run on the unit of work's open transaction. Writes are staged and
/// only executed when the unit of work flushes, so a repository never
/// commits anything by itself.
pub struct Repository<'u, E: EntityTrait> {
    uow: &'u UnitOfWork,
    generation: u64,
    _entity: PhantomData<fn() -> E>,
}

impl<'u, E: EntityTrait> Repository<'u, E> {
    pub(crate) fn new(uow: &'u UnitOfWork, generation: u64) -> Self {
        Self {
            uow,
            generation,
            _entity: PhantomData,
        }
    }
}

impl<E> Repository<'_, E>
where
    E: EntityTrait,
    E::Model: Send + Sync + 'static,
{
    pub async fn find_by_id<K>(&self, id: K) -> Result<Option<E::Model>, RepositoryError>
    where
        K: Into<<E::PrimaryKey as PrimaryKeyTrait>::ValueType>,
    {
        let select = E::find_by_id(id);
        let txn = self.uow.active_transaction(self.generation).await?;
        Ok(select.one(&*txn).await?)
    }

    pub async fn find_all(&self) -> Result<Vec<E::Model>, RepositoryError> {
        let txn = self.uow.active_transaction(self.generation).await?;
        Ok(E::find().all(&*txn).await?)
    }

    pub async fn find(&self, condition: Condition) -> Result<Vec<E::Model>, RepositoryError> {
        let txn = self.uow.active_transaction(self.generation).await?;
        Ok(E::find().filter(condition).all(&*txn).await?)
    }

    pub async fn first(&self, condition: Condition) -> Result<Option<E::Model>, RepositoryError> {
        let txn = self.uow.active_transaction(self.generation).await?;
        Ok(E::find().filter(condition).one(&*txn).await?)
    }

    /// First match, locked for update until the transaction ends. Backends
    /// without row locks (SQLite) already serialize writers.
    pub async fn first_for_update(
        &self,
        condition: Condition,
    ) -> Result<Option<E::Model>, RepositoryError> {
        let txn = self.uow.active_transaction(self.generation).await?;
        Ok(E::find()
            .filter(condition)
            .lock_exclusive()
            .one(&*txn)
            .await?)
    }

    pub async fn any(&self, condition: Condition) -> Result<bool, RepositoryError> {
        Ok(self.first(condition).await?.is_some())
    }

    pub async fn count(&self, condition: Condition) -> Result<u64, RepositoryError> {
        let txn = self.uow.active_transaction(self.generation).await?;
        Ok(E::find().filter(condition).count(&*txn).await?)
    }

    pub async fn find_page(&self, spec: QuerySpec<E>) -> Result<Page<E::Model>, RepositoryError> {
        let (select, page) = spec.apply(E::find());
        let txn = self.uow.active_transaction(self.generation).await?;
        match page {
            Some((index, size)) => {
                let paginator = select.paginate(&*txn, size);
                let totals = paginator.num_items_and_pages().await?;
                let items = paginator.fetch_page(index).await?;
                Ok(Page {
                    items,
                    page_index: index,
                    page_size: size,
                    total_items: totals.number_of_items,
                    total_pages: totals.number_of_pages,
                })
            }
            None => Ok(Page::unpaged(select.all(&*txn).await?)),
        }
    }

    /// Like [`find_page`](Self::find_page), eagerly joining the related `R`
    /// record through the entity's declared relation.
    pub async fn find_page_with<R>(
        &self,
        spec: QuerySpec<E>,
    ) -> Result<Page<(E::Model, Option<R::Model>)>, RepositoryError>
    where
        R: EntityTrait,
        R::Model: Send + Sync + 'static,
        E: Related<R>,
    {
        let (select, page) = spec.apply(E::find().find_also_related(R::default()));
        let txn = self.uow.active_transaction(self.generation).await?;
        match page {
            Some((index, size)) => {
                let paginator = select.paginate(&*txn, size);
                let totals = paginator.num_items_and_pages().await?;
                let items = paginator.fetch_page(index).await?;
                Ok(Page {
                    items,
                    page_index: index,
                    page_size: size,
                    total_items: totals.number_of_items,
                    total_pages: totals.number_of_pages,
                })
            }
            None => Ok(Page::unpaged(select.all(&*txn).await?)),
        }
    }

    /// Parameterized SQL returning rows of `E`. Placeholders follow the
    /// backend's syntax (`$1` for Postgres, `?` otherwise).
    pub async fn raw_query(
        &self,
        sql: &str,
        values: Vec<Value>,
    ) -> Result<Vec<E::Model>, RepositoryError> {
        let statement = Statement::from_sql_and_values(self.uow.backend(), sql, values);
        let txn = self.uow.active_transaction(self.generation).await?;
        Ok(E::find().from_raw_sql(statement).all(&*txn).await?)
    }

    pub async fn add<A>(&self, model: A) -> Result<(), RepositoryError>
    where
        A: ActiveModelTrait<Entity = E>,
    {
        let statement = E::insert(model).build(self.uow.backend());
        self.stage(statement, RowExpectation::Any).await
    }

    pub async fn add_range<A>(&self, models: Vec<A>) -> Result<(), RepositoryError>
    where
        A: ActiveModelTrait<Entity = E>,
    {
        if models.is_empty() {
            return Ok(());
        }
        let statement = E::insert_many(models).build(self.uow.backend());
        self.stage(statement, RowExpectation::Any).await
    }

    /// Stage an update of the `Set` columns of `model`, matched by primary
    /// key. Fails with `NotFound` at flush time if the row is gone.
    pub async fn update<A>(&self, model: A) -> Result<(), RepositoryError>
    where
        A: ActiveModelTrait<Entity = E>,
    {
        let statement = E::update(model).build(self.uow.backend());
        self.stage(statement, RowExpectation::Exists).await
    }

    pub async fn update_range<A>(&self, models: Vec<A>) -> Result<(), RepositoryError>
    where
        A: ActiveModelTrait<Entity = E>,
    {
        for model in models {
            self.update(model).await?;
        }
        Ok(())
    }

    /// Stage deletion of the row matching `model`'s primary key. Fails with
    /// `NotFound` at flush time if the row is already gone.
    pub async fn remove<A>(&self, model: A) -> Result<(), RepositoryError>
    where
        A: ActiveModelTrait<Entity = E>,
    {
        let statement = E::delete(model).build(self.uow.backend());
        self.stage(statement, RowExpectation::Exists).await
    }

    pub async fn remove_range<A>(&self, models: Vec<A>) -> Result<(), RepositoryError>
    where
        A: ActiveModelTrait<Entity = E>,
    {
        for model in models {
            self.remove(model).await?;
        }
        Ok(())
    }

    /// Stage an update of the `Set` columns of `model` on the rows matching
    /// `condition`. Matching no row at flush time fails with `Stale`, so the
    /// condition doubles as an optimistic concurrency check.
    pub async fn update_where<A>(
        &self,
        model: A,
        condition: Condition,
    ) -> Result<(), RepositoryError>
    where
        A: ActiveModelTrait<Entity = E>,
    {
        let statement = E::update_many()
            .set(model)
            .filter(condition)
            .build(self.uow.backend());
        self.stage(statement, RowExpectation::Current).await
    }

    /// Stage deletion of the rows matching `condition`; `Stale` at flush time
    /// if none match.
    pub async fn remove_where(&self, condition: Condition) -> Result<(), RepositoryError> {
        let statement = E::delete_many()
            .filter(condition)
            .build(self.uow.backend());
        self.stage(statement, RowExpectation::Current).await
    }

    async fn stage(
        &self,
        statement: Statement,
        expectation: RowExpectation,
    ) -> Result<(), RepositoryError> {
        self.uow
            .stage(self.generation, PendingWrite::new::<E>(statement, expectation))
            .await
    }
}

impl From<DbErr> for RepositoryError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return RepositoryError::Duplicate(detail);
        }
        match err {
            DbErr::RecordNotFound(_) | DbErr::RecordNotUpdated => RepositoryError::NotFound,
            other if is_transient(&other) => RepositoryError::Transient(other.to_string()),
            other => RepositoryError::DatabaseError(other.to_string()),
        }
    }
}

// Postgres serialization failure / deadlock, MySQL SQLSTATE for deadlock,
// SQLite busy / locked.
const TRANSIENT_CODES: [&str; 5] = ["40001", "40P01", "5", "6", "517"];

// MySQL reports lock wait timeout as SQLSTATE HY000; only the error number
// tells it apart.
const MYSQL_TRANSIENT_NUMBERS: [u16; 2] = [1205, 1213];

fn is_transient(err: &DbErr) -> bool {
    let (code, mysql_number) = database_code(err);
    if is_transient_code(code.as_deref(), mysql_number) {
        return true;
    }
    let message = err.to_string().to_lowercase();
    message.contains("could not serialize")
        || message.contains("deadlock")
        || message.contains("database is locked")
}

fn is_transient_code(code: Option<&str>, mysql_number: Option<u16>) -> bool {
    code.is_some_and(|code| TRANSIENT_CODES.contains(&code))
        || mysql_number.is_some_and(|number| MYSQL_TRANSIENT_NUMBERS.contains(&number))
}

fn database_code(err: &DbErr) -> (Option<String>, Option<u16>) {
    let runtime = match err {
        DbErr::Exec(runtime) | DbErr::Query(runtime) | DbErr::Conn(runtime) => runtime,
        _ => return (None, None),
    };
    match runtime {
        RuntimeErr::SqlxError(sqlx::Error::Database(db_err)) => (
            db_err.code().map(|code| code.into_owned()),
            db_err
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|mysql| mysql.number()),
        ),
        _ => (None, None),
    }
}
