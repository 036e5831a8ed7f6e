//! Driver adapter.
//!
//! Everything above this module talks to PostgreSQL through [`Driver`] and
//! [`DriverConnection`]. [`PgDriver`] is the production implementation over a
//! `deadpool_postgres::Pool`; tests plug in scripted drivers.

use crate::config::PoolErrorHandler;
use crate::error::{CrudError, CrudResult};
use crate::monitor::Command;
use crate::value::{Record, bind_params, param_refs, row_to_record};
use deadpool_postgres::{Object, Pool};
use serde_json::Value;
use std::future::Future;

/// What a single statement produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryOutput {
    pub command: Option<Command>,
    /// Returned rows for row-producing statements, affected rows otherwise.
    pub row_count: u64,
    pub rows: Vec<Record>,
}

impl QueryOutput {
    /// Output of a row-producing statement.
    pub fn rows(rows: Vec<Record>) -> Self {
        Self {
            command: None,
            row_count: rows.len() as u64,
            rows,
        }
    }

    /// Output of a statement without a result set.
    pub fn affected(count: u64) -> Self {
        Self {
            command: None,
            row_count: count,
            rows: Vec::new(),
        }
    }
}

/// A pool of connections that can also run one-off statements.
pub trait Driver: Send + Sync + 'static {
    type Conn: DriverConnection;

    /// Run a statement on any pooled connection.
    fn query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = CrudResult<QueryOutput>> + Send;

    /// Check out a dedicated connection.
    fn connect(&self) -> impl Future<Output = CrudResult<Self::Conn>> + Send;
}

/// A checked-out connection.
///
/// Consuming `release`/`discard` makes a double release impossible. A
/// connection dropped without either is treated like `discard`.
pub trait DriverConnection: Send + Sync + 'static {
    fn query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = CrudResult<QueryOutput>> + Send;

    /// Return the connection to the pool for reuse.
    fn release(self);

    /// Give the slot back to the pool but close the connection, because its
    /// session state (an open or aborted transaction) is unknown.
    fn discard(self);
}

/// `deadpool-postgres` backed driver.
#[derive(Clone)]
pub struct PgDriver {
    pool: Pool,
    on_error: PoolErrorHandler,
}

impl PgDriver {
    pub fn new(pool: Pool, on_error: PoolErrorHandler) -> Self {
        Self { pool, on_error }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn checkout(&self) -> CrudResult<Object> {
        self.pool.get().await.map_err(|e| {
            let err = CrudError::from(e);
            (self.on_error)(&err);
            err
        })
    }
}

/// Run one statement on a pooled client.
///
/// Statements with result columns go through `query`; the others through
/// `execute`, so `row_count` is the affected count.
async fn run(
    client: &deadpool_postgres::ClientWrapper,
    sql: &str,
    params: &[Value],
) -> CrudResult<QueryOutput> {
    let bound = bind_params(params);
    let refs = param_refs(&bound);
    let stmt = client.prepare_cached(sql).await?;

    let mut output = if stmt.columns().is_empty() {
        QueryOutput::affected(client.execute(&stmt, &refs).await?)
    } else {
        let rows = client.query(&stmt, &refs).await?;
        let records = rows
            .iter()
            .map(row_to_record)
            .collect::<CrudResult<Vec<_>>>()?;
        QueryOutput::rows(records)
    };
    output.command = Some(Command::from_sql(sql));
    Ok(output)
}

impl Driver for PgDriver {
    type Conn = PgConnection;

    async fn query(&self, sql: &str, params: &[Value]) -> CrudResult<QueryOutput> {
        let client = self.checkout().await?;
        run(&client, sql, params).await
    }

    async fn connect(&self) -> CrudResult<PgConnection> {
        let client = self.checkout().await?;
        Ok(PgConnection {
            client: Some(client),
        })
    }
}

/// A pooled `deadpool-postgres` connection.
///
/// Dropping it without [`release`](DriverConnection::release) detaches the
/// connection from the pool, so a transaction left open by a cancelled
/// future is never handed to the next caller.
pub struct PgConnection {
    client: Option<Object>,
}

impl PgConnection {
    fn client(&self) -> CrudResult<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| CrudError::Pool("connection already returned to the pool".to_string()))
    }
}

impl DriverConnection for PgConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> CrudResult<QueryOutput> {
        let client = self.client()?;
        // Transaction control must not be cached as a prepared statement.
        if params.is_empty() && is_transaction_control(sql) {
            client.batch_execute(sql).await?;
            return Ok(QueryOutput {
                command: Some(Command::Other),
                ..QueryOutput::default()
            });
        }
        run(client, sql, params).await
    }

    fn release(mut self) {
        drop(self.client.take());
    }

    fn discard(mut self) {
        if let Some(client) = self.client.take() {
            drop(Object::take(client));
        }
    }
}

impl Drop for PgConnection {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            drop(Object::take(client));
        }
    }
}

fn is_transaction_control(sql: &str) -> bool {
    let head = sql.trim_start();
    ["BEGIN", "COMMIT", "ROLLBACK"]
        .iter()
        .any(|kw| head.get(..kw.len()).is_some_and(|h| h.eq_ignore_ascii_case(kw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_constructors() {
        let out = QueryOutput::rows(vec![Record::new(), Record::new()]);
        assert_eq!(out.row_count, 2);
        let out = QueryOutput::affected(5);
        assert_eq!(out.row_count, 5);
        assert!(out.rows.is_empty());
    }

    #[test]
    fn detects_transaction_control() {
        assert!(is_transaction_control("BEGIN"));
        assert!(is_transaction_control("  commit"));
        assert!(is_transaction_control("ROLLBACK"));
        assert!(!is_transaction_control("SELECT 1"));
    }
}
