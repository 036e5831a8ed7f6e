//! Transactions on a dedicated connection.
//!
//! A [`Transaction`] owns one pooled connection from `BEGIN` until
//! [`commit`](Transaction::commit) or [`rollback`](Transaction::rollback),
//! both of which consume it. The connection goes back to the pool on
//! success; when `COMMIT`/`ROLLBACK` fails (or the handle is dropped while
//! still open) it is detached from the pool instead, because its session
//! state is unknown.
//!
//! ```ignore
//! let tx = db.begin(Some("user-42")).await?;
//! let orders = tx.table("orders")?;
//! let order = orders.insert(&new_order).await?;
//! tx.table("order_items")?.insert_many(&items).await?;
//! tx.commit().await?;
//! ```

use crate::database::Database;
use crate::driver::{Driver, DriverConnection, PgDriver};
use crate::error::{CrudError, CrudResult};
use crate::executor::{QueryOptions, QueryResult, Target};
use crate::table::Table;
use serde_json::Value;
use std::fmt;

/// Statement recording the audit user id for the current transaction only.
pub(crate) const SET_AUDIT_SQL: &str = "SELECT set_config($1, $2, true)";

/// An open transaction.
pub struct Transaction<D: Driver = PgDriver> {
    db: Database<D>,
    conn: Option<D::Conn>,
    audit_user_id: Option<String>,
}

impl<D: Driver> fmt::Debug for Transaction<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("db", &self.db)
            .field("audit_user_id", &self.audit_user_id)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Transaction<D> {
    pub(crate) async fn begin(db: Database<D>, audit_user_id: Option<&str>) -> CrudResult<Self> {
        let conn = db.driver().connect().await?;

        if let Err(err) = conn.query("BEGIN", &[]).await {
            conn.discard();
            return Err(err);
        }

        if let Some(user_id) = audit_user_id {
            let params = [
                Value::String(db.audit_setting().to_string()),
                Value::String(user_id.to_string()),
            ];
            if let Err(err) = conn.query(SET_AUDIT_SQL, &params).await {
                conn.discard();
                return Err(err);
            }
        }

        tracing::debug!(target: "pgcrud.tx", audit = ?audit_user_id, "transaction started");
        Ok(Self {
            db,
            conn: Some(conn),
            audit_user_id: audit_user_id.map(str::to_owned),
        })
    }

    pub(crate) fn connection(&self) -> CrudResult<&D::Conn> {
        self.conn
            .as_ref()
            .ok_or_else(|| CrudError::Pool("transaction connection already released".to_string()))
    }

    /// The audit user id recorded at `BEGIN`, if any.
    pub fn audit_user_id(&self) -> Option<&str> {
        self.audit_user_id.as_deref()
    }

    /// Run arbitrary SQL inside the transaction.
    ///
    /// `opts.audit_user_id` is ignored here; the transaction's own id (if any)
    /// already applies to every statement.
    pub async fn query(&self, sql: &str, params: &[Value], opts: &QueryOptions) -> CrudResult<QueryResult> {
        let target = Target::Conn {
            conn: self.connection()?,
            audit: self.audit_user_id.as_deref(),
        };
        self.db.execute(target, sql, params, opts).await
    }

    /// CRUD helpers for `name` that run inside this transaction.
    pub fn table(&self, name: &str) -> CrudResult<Table<'_, D>> {
        let target = Target::Conn {
            conn: self.connection()?,
            audit: self.audit_user_id.as_deref(),
        };
        Table::new(self.db.clone(), target, name)
    }

    /// `COMMIT` and hand the connection back to the pool.
    pub async fn commit(mut self) -> CrudResult<()> {
        self.finish("COMMIT").await
    }

    /// `ROLLBACK` and hand the connection back to the pool.
    pub async fn rollback(mut self) -> CrudResult<()> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, sql: &'static str) -> CrudResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        match conn.query(sql, &[]).await {
            Ok(_) => {
                conn.release();
                tracing::debug!(target: "pgcrud.tx", statement = sql, "transaction finished");
                Ok(())
            }
            Err(err) => {
                conn.discard();
                tracing::debug!(
                    target: "pgcrud.tx",
                    statement = sql,
                    error = %err,
                    "transaction end failed; connection detached from pool"
                );
                Err(err)
            }
        }
    }
}

impl<D: Driver> Drop for Transaction<D> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.discard();
            tracing::warn!(
                target: "pgcrud.tx",
                "transaction dropped without commit or rollback; connection detached from pool"
            );
        }
    }
}
