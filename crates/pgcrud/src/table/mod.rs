//! Table-scoped CRUD helpers.
//!
//! A [`Table`] is created from a [`Database`] (statements use the pool) or
//! from a [`Transaction`](crate::Transaction) (statements run on the
//! transaction's connection). Payloads are any `Serialize` value that
//! serializes to a JSON object; rows come back as [`Record`]s.
//!
//! ```ignore
//! use pgcrud::{Where, WriteOutcome};
//! use serde_json::json;
//!
//! let products = db.table("products")?;
//! let cheap = products.find("id, name", Where::lt("price", 10)).await?;
//!
//! match products
//!     .upsert(&json!({"sku": "A-1", "price": 3}), Where::eq("sku", "A-1"))
//!     .await?
//! {
//!     WriteOutcome::Inserted(row) | WriteOutcome::Updated(row) => println!("{row:?}"),
//!     WriteOutcome::Existing(_) => unreachable!(),
//! }
//! ```

mod audited;

pub use audited::AuditedTable;

use crate::condition::Where;
use crate::database::Database;
use crate::driver::{Driver, PgDriver};
use crate::error::{CrudError, CrudResult};
use crate::executor::{QueryOptions, QueryResult, Target};
use crate::ident;
use crate::statement::{self, Statement, payload_record};
use crate::value::Record;
use serde::Serialize;
use serde_json::Value;

/// What a conditional write did.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// No row matched; the payload was inserted.
    Inserted(Record),
    /// One row matched and was updated.
    Updated(Record),
    /// One row matched and was left untouched.
    Existing(Record),
}

impl WriteOutcome {
    /// The inserted, updated or existing row.
    pub fn into_record(self) -> Record {
        match self {
            Self::Inserted(r) | Self::Updated(r) | Self::Existing(r) => r,
        }
    }

    pub fn record(&self) -> &Record {
        match self {
            Self::Inserted(r) | Self::Updated(r) | Self::Existing(r) => r,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// CRUD helpers bound to one table.
pub struct Table<'a, D: Driver = PgDriver> {
    db: Database<D>,
    target: Target<'a, D>,
    name: String,
    opts: QueryOptions,
}

impl<D: Driver> Clone for Table<'_, D> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            target: self.target,
            name: self.name.clone(),
            opts: self.opts.clone(),
        }
    }
}

impl<'a, D: Driver> Table<'a, D> {
    pub(crate) fn new(db: Database<D>, target: Target<'a, D>, name: &str) -> CrudResult<Self> {
        let name = ident::table_name(name)?;
        Ok(Self {
            db,
            target,
            name,
            opts: QueryOptions::default(),
        })
    }

    /// The table name as interpolated into SQL.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options applied to every statement of this table.
    pub fn with_options(mut self, opts: QueryOptions) -> Self {
        self.opts = opts;
        self
    }

    /// Label every statement of this table in the logs.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.opts.alias = Some(alias.into());
        self
    }

    /// A view whose writes run as audited transactions for `user_id`.
    pub fn audited(&self, user_id: impl Into<String>) -> AuditedTable<'a, D> {
        AuditedTable::new(self.clone(), user_id.into())
    }

    /// Reads never open an audit transaction.
    fn read_options(&self) -> QueryOptions {
        QueryOptions {
            audit_user_id: None,
            alias: self.opts.alias.clone(),
        }
    }

    async fn run(&self, stmt: Statement, opts: &QueryOptions) -> CrudResult<QueryResult> {
        self.db.execute(self.target, &stmt.sql, &stmt.params, opts).await
    }

    /// Run a write that must return exactly one row.
    async fn run_single(&self, stmt: Statement, opts: &QueryOptions) -> CrudResult<Record> {
        self.db
            .execute_expecting(self.target, &stmt.sql, &stmt.params, opts, Some(1))
            .await?
            .single()
    }

    async fn read(&self, stmt: Statement) -> CrudResult<QueryResult> {
        let opts = self.read_options();
        self.run(stmt, &opts).await
    }

    fn case(&self) -> crate::config::ColumnCase {
        self.db.column_case()
    }

    /// `SELECT * FROM t WHERE id = $1`
    pub async fn get_by_id(&self, id: impl Into<Value>) -> CrudResult<Option<Record>> {
        let stmt = statement::select_by_id(&self.name, id.into())?;
        Ok(self.read(stmt).await?.into_first())
    }

    /// Every row, restricted to `columns` (`"*"` or a comma-separated list).
    pub async fn get_all(&self, columns: &str) -> CrudResult<Vec<Record>> {
        let stmt = statement::select(&self.name, columns, &Where::none(), None, self.case())?;
        Ok(self.read(stmt).await?.rows)
    }

    /// The first row matching `cond`.
    pub async fn first_row(&self, columns: &str, cond: impl Into<Where>) -> CrudResult<Option<Record>> {
        let stmt = statement::select(&self.name, columns, &cond.into(), Some(1), self.case())?;
        Ok(self.read(stmt).await?.into_first())
    }

    /// Every row matching `cond`, in server order.
    pub async fn find(&self, columns: &str, cond: impl Into<Where>) -> CrudResult<Vec<Record>> {
        let stmt = statement::select(&self.name, columns, &cond.into(), None, self.case())?;
        Ok(self.read(stmt).await?.rows)
    }

    /// `first_row("*", cond)`
    pub async fn find_one(&self, cond: impl Into<Where>) -> CrudResult<Option<Record>> {
        self.first_row("*", cond).await
    }

    pub async fn count(&self, cond: impl Into<Where>) -> CrudResult<i64> {
        let stmt = statement::count(&self.name, &cond.into(), self.case())?;
        let row = self.read(stmt).await?.single()?;
        row.get("count")
            .and_then(Value::as_i64)
            .ok_or_else(|| CrudError::decode("count", "expected an integer"))
    }

    pub async fn exists(&self, cond: impl Into<Where>) -> CrudResult<bool> {
        let stmt = statement::exists(&self.name, &cond.into(), self.case())?;
        let row = self.read(stmt).await?.single()?;
        row.get("exists")
            .and_then(Value::as_bool)
            .ok_or_else(|| CrudError::decode("exists", "expected a boolean"))
    }

    pub(crate) async fn insert_with<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        opts: &QueryOptions,
    ) -> CrudResult<Record> {
        let record = payload_record(payload)?;
        let stmt = statement::insert(&self.name, &record, self.case())?;
        self.run_single(stmt, opts).await
    }

    pub(crate) async fn insert_many_with<T: Serialize>(
        &self,
        payloads: &[T],
        opts: &QueryOptions,
    ) -> CrudResult<Vec<Record>> {
        if payloads.is_empty() {
            return Ok(Vec::new());
        }
        let records = payloads
            .iter()
            .map(payload_record)
            .collect::<CrudResult<Vec<_>>>()?;
        let stmt = statement::insert_many(&self.name, &records, self.case())?;
        Ok(self.run(stmt, opts).await?.rows)
    }

    pub(crate) async fn update_with<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        cond: &Where,
        opts: &QueryOptions,
    ) -> CrudResult<QueryResult> {
        let record = payload_record(payload)?;
        let stmt = statement::update(&self.name, &record, cond, self.case())?;
        self.run(stmt, opts).await
    }

    pub(crate) async fn delete_with(&self, cond: &Where, opts: &QueryOptions) -> CrudResult<QueryResult> {
        let stmt = statement::delete(&self.name, cond, self.case())?;
        self.run(stmt, opts).await
    }

    /// Look up the single row a conditional write targets.
    async fn conditional_target(&self, cond: &Where) -> CrudResult<Option<Record>> {
        let mut rows = self.find("*", cond.clone()).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            matched => Err(CrudError::InvalidCondition {
                table: self.name.clone(),
                matched,
            }),
        }
    }

    pub(crate) async fn insert_if_not_exists_with<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        cond: &Where,
        opts: &QueryOptions,
    ) -> CrudResult<WriteOutcome> {
        match self.conditional_target(cond).await? {
            Some(existing) => Ok(WriteOutcome::Existing(existing)),
            None => Ok(WriteOutcome::Inserted(self.insert_with(payload, opts).await?)),
        }
    }

    pub(crate) async fn upsert_with<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        cond: &Where,
        opts: &QueryOptions,
    ) -> CrudResult<WriteOutcome> {
        match self.conditional_target(cond).await? {
            Some(_) => {
                let record = payload_record(payload)?;
                let stmt = statement::update(&self.name, &record, cond, self.case())?;
                Ok(WriteOutcome::Updated(self.run_single(stmt, opts).await?))
            }
            None => Ok(WriteOutcome::Inserted(self.insert_with(payload, opts).await?)),
        }
    }

    /// `INSERT .. RETURNING *`, returning the inserted row.
    pub async fn insert<T: Serialize + ?Sized>(&self, payload: &T) -> CrudResult<Record> {
        self.insert_with(payload, &self.opts).await
    }

    /// Insert several rows with one statement. All payloads must have the
    /// same keys.
    pub async fn insert_many<T: Serialize>(&self, payloads: &[T]) -> CrudResult<Vec<Record>> {
        self.insert_many_with(payloads, &self.opts).await
    }

    /// Insert unless a row already matches `cond`.
    ///
    /// Fails with [`CrudError::InvalidCondition`] when several rows match.
    pub async fn insert_if_not_exists<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        cond: impl Into<Where>,
    ) -> CrudResult<WriteOutcome> {
        self.insert_if_not_exists_with(payload, &cond.into(), &self.opts)
            .await
    }

    /// `UPDATE .. SET .. WHERE cond RETURNING *`. The `id` key of the
    /// payload is never written.
    pub async fn update<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        cond: impl Into<Where>,
    ) -> CrudResult<QueryResult> {
        self.update_with(payload, &cond.into(), &self.opts).await
    }

    /// Update the row matching `cond`, or insert the payload when none does.
    ///
    /// Fails with [`CrudError::InvalidCondition`] when several rows match.
    pub async fn upsert<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        cond: impl Into<Where>,
    ) -> CrudResult<WriteOutcome> {
        self.upsert_with(payload, &cond.into(), &self.opts).await
    }

    /// `DELETE .. WHERE cond RETURNING *`. An empty condition is rejected.
    pub async fn delete(&self, cond: impl Into<Where>) -> CrudResult<QueryResult> {
        self.delete_with(&cond.into(), &self.opts).await
    }
}
