use super::{Table, WriteOutcome};
use crate::condition::Where;
use crate::driver::{Driver, PgDriver};
use crate::error::CrudResult;
use crate::executor::{QueryOptions, QueryResult};
use crate::value::Record;
use serde::Serialize;

/// A [`Table`] whose writes carry an audit user id.
///
/// On a pooled table every write runs as `BEGIN`, `set_config(..)`, the
/// statement, then `COMMIT` (or `ROLLBACK` on failure). Inside a transaction
/// the transaction's own audit id applies instead. The lookups performed by
/// [`upsert`](Self::upsert) and [`insert_if_not_exists`](Self::insert_if_not_exists)
/// are plain reads.
pub struct AuditedTable<'a, D: Driver = PgDriver> {
    table: Table<'a, D>,
    opts: QueryOptions,
}

impl<'a, D: Driver> AuditedTable<'a, D> {
    pub(super) fn new(table: Table<'a, D>, user_id: String) -> Self {
        let opts = table.opts.clone().audit_user_id(user_id);
        Self { table, opts }
    }

    /// The audit user id written by every statement.
    pub fn user_id(&self) -> &str {
        self.opts.audit_user_id.as_deref().unwrap_or_default()
    }

    /// The underlying table, for reads.
    pub fn table(&self) -> &Table<'a, D> {
        &self.table
    }

    pub async fn insert<T: Serialize + ?Sized>(&self, payload: &T) -> CrudResult<Record> {
        self.table.insert_with(payload, &self.opts).await
    }

    pub async fn insert_many<T: Serialize>(&self, payloads: &[T]) -> CrudResult<Vec<Record>> {
        self.table.insert_many_with(payloads, &self.opts).await
    }

    pub async fn insert_if_not_exists<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        cond: impl Into<Where>,
    ) -> CrudResult<WriteOutcome> {
        self.table
            .insert_if_not_exists_with(payload, &cond.into(), &self.opts)
            .await
    }

    pub async fn update<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        cond: impl Into<Where>,
    ) -> CrudResult<QueryResult> {
        self.table.update_with(payload, &cond.into(), &self.opts).await
    }

    pub async fn upsert<T: Serialize + ?Sized>(
        &self,
        payload: &T,
        cond: impl Into<Where>,
    ) -> CrudResult<WriteOutcome> {
        self.table.upsert_with(payload, &cond.into(), &self.opts).await
    }

    pub async fn delete(&self, cond: impl Into<Where>) -> CrudResult<QueryResult> {
        self.table.delete_with(&cond.into(), &self.opts).await
    }
}
