//! Statement execution.
//!
//! Every statement goes through [`Database::execute`]: it is timed, routed
//! through an audit transaction when asked to, logged exactly once and its
//! row keys are cased according to the configuration.

use crate::database::Database;
use crate::driver::{Driver, DriverConnection, QueryOutput};
use crate::error::{CrudError, CrudResult};
use crate::monitor::{Command, QueryLogger, QueryStats, clean_alias, log_isolated};
use crate::transaction::Transaction;
use crate::value::{Record, rekey};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Instant;

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Run the statement inside a transaction that first records this id in
    /// the audit session setting.
    pub audit_user_id: Option<String>,
    /// Label attached to the log entry.
    pub alias: Option<String>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audit_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.audit_user_id = Some(user_id.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Rows and counts produced by a statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub command: Command,
    /// Returned rows for reads and `RETURNING` writes, affected rows otherwise.
    pub row_count: u64,
    pub rows: Vec<Record>,
}

impl QueryResult {
    fn from_output(output: QueryOutput, command: Command, case: crate::config::ColumnCase) -> Self {
        Self {
            command,
            row_count: output.row_count,
            rows: output.rows.into_iter().map(|r| rekey(r, case)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Record> {
        self.rows.first()
    }

    pub fn into_first(self) -> Option<Record> {
        self.rows.into_iter().next()
    }

    /// The only row, failing when the statement returned zero or several.
    pub fn single(self) -> CrudResult<Record> {
        match self.rows.len() {
            1 => self
                .rows
                .into_iter()
                .next()
                .ok_or(CrudError::UnexpectedRowCount { expected: 1, got: 0 }),
            got => Err(CrudError::UnexpectedRowCount { expected: 1, got }),
        }
    }

    /// Deserialize every row into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> CrudResult<Vec<T>> {
        self.rows
            .iter()
            .map(|row| {
                serde_json::from_value(Value::Object(row.clone()))
                    .map_err(|e| CrudError::decode("<row>", e.to_string()))
            })
            .collect()
    }
}

/// Where a statement runs.
pub(crate) enum Target<'a, D: Driver> {
    /// Any pooled connection; audited calls open their own transaction.
    Pool,
    /// An open transaction's connection.
    Conn {
        conn: &'a D::Conn,
        audit: Option<&'a str>,
    },
}

impl<D: Driver> Clone for Target<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D: Driver> Copy for Target<'_, D> {}

/// A statement waiting to be logged. Consumed by [`Pending::finish`], so
/// each call is logged once.
struct Pending<'q> {
    started: Instant,
    sql: &'q str,
    params: &'q [Value],
    alias: Option<String>,
    audit: Option<String>,
}

impl<'q> Pending<'q> {
    fn new(sql: &'q str, params: &'q [Value], opts: &QueryOptions, audit: Option<&str>) -> Self {
        Self {
            started: Instant::now(),
            sql,
            params,
            alias: opts.alias.as_deref().map(clean_alias),
            audit: audit.map(str::to_owned),
        }
    }

    fn finish(self, logger: &dyn QueryLogger, outcome: &CrudResult<QueryOutput>) {
        let stats = QueryStats {
            command: command_of(self.sql, outcome),
            took: self.started.elapsed(),
            rows: outcome.as_ref().map_or(0, |o| o.row_count),
            alias: self.alias,
            audit: self.audit,
            failed: outcome.is_err(),
        };
        log_isolated(logger, self.sql, self.params, &stats);
    }
}

fn command_of(sql: &str, outcome: &CrudResult<QueryOutput>) -> Command {
    outcome
        .as_ref()
        .ok()
        .and_then(|o| o.command)
        .unwrap_or_else(|| Command::from_sql(sql))
}

/// Reject an output whose row count differs from `expected`.
fn check_rows(outcome: CrudResult<QueryOutput>, expected: Option<usize>) -> CrudResult<QueryOutput> {
    match (outcome, expected) {
        (Ok(output), Some(expected)) if output.rows.len() != expected => Err(CrudError::UnexpectedRowCount {
            expected,
            got: output.rows.len(),
        }),
        (outcome, _) => outcome,
    }
}

impl<D: Driver> Database<D> {
    pub(crate) async fn execute(
        &self,
        target: Target<'_, D>,
        sql: &str,
        params: &[Value],
        opts: &QueryOptions,
    ) -> CrudResult<QueryResult> {
        self.execute_expecting(target, sql, params, opts, None).await
    }

    /// Like [`execute`](Self::execute), but fails with
    /// [`CrudError::UnexpectedRowCount`] unless exactly `expected` rows come
    /// back. An audit transaction opened for the call is rolled back on a
    /// mismatch.
    pub(crate) async fn execute_expecting(
        &self,
        target: Target<'_, D>,
        sql: &str,
        params: &[Value],
        opts: &QueryOptions,
        expected: Option<usize>,
    ) -> CrudResult<QueryResult> {
        let output = match target {
            Target::Conn { conn, audit } => {
                let pending = Pending::new(sql, params, opts, audit);
                let outcome = check_rows(conn.query(sql, params).await, expected);
                pending.finish(self.logger(), &outcome);
                outcome?
            }
            Target::Pool => match opts.audit_user_id.as_deref() {
                Some(user_id) => {
                    let pending = Pending::new(sql, params, opts, Some(user_id));
                    self.run_audited(user_id, pending, expected).await?
                }
                None => {
                    let pending = Pending::new(sql, params, opts, None);
                    let outcome = check_rows(self.driver().query(sql, params).await, expected);
                    pending.finish(self.logger(), &outcome);
                    outcome?
                }
            },
        };

        let command = output.command.unwrap_or_else(|| Command::from_sql(sql));
        Ok(QueryResult::from_output(output, command, self.column_case()))
    }

    /// BEGIN, set the audit id, run the statement, then COMMIT or ROLLBACK.
    ///
    /// A successful statement is logged once COMMIT has answered. A failed
    /// one is logged before the ROLLBACK is sent.
    async fn run_audited(
        &self,
        user_id: &str,
        pending: Pending<'_>,
        expected: Option<usize>,
    ) -> CrudResult<QueryOutput> {
        let tx = match Transaction::begin(self.clone(), Some(user_id)).await {
            Ok(tx) => tx,
            Err(err) => {
                let outcome = Err(err);
                pending.finish(self.logger(), &outcome);
                return outcome;
            }
        };
        let outcome = match tx.connection() {
            Ok(conn) => check_rows(conn.query(pending.sql, pending.params).await, expected),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(output) => {
                let committed = tx.commit().await.map(|()| output);
                pending.finish(self.logger(), &committed);
                committed
            }
            Err(err) => {
                let outcome = Err(err);
                pending.finish(self.logger(), &outcome);
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        target: "pgcrud.tx",
                        error = %rollback_err,
                        "rollback after failed audited statement failed"
                    );
                }
                outcome
            }
        }
    }
}
