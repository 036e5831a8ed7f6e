//! The database handle.

use crate::config::{ColumnCase, DatabaseConfig};
use crate::driver::{Driver, PgDriver};
use crate::error::CrudResult;
use crate::executor::{QueryOptions, QueryResult, Target};
use crate::monitor::QueryLogger;
use crate::pool::{create_pool, create_pool_with_tls};
use crate::table::Table;
use crate::transaction::Transaction;
use deadpool_postgres::Pool;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_postgres::Socket;
use tokio_postgres::tls::{MakeTlsConnect, TlsConnect};

struct Shared<D> {
    driver: D,
    logger: Arc<dyn QueryLogger>,
    column_case: ColumnCase,
    audit_setting: String,
}

/// A handle to a PostgreSQL database.
///
/// Cheap to clone; every [`Table`] and [`Transaction`] holds one. There is no
/// process-wide state, so several databases can be used side by side.
///
/// # Example
///
/// ```ignore
/// use pgcrud::{Database, DatabaseConfig, QueryOptions};
/// use serde_json::json;
///
/// let db = Database::connect(DatabaseConfig::from_env()?)?;
/// let products = db.table("products")?;
/// let row = products.insert(&json!({"name": "a", "price": 1})).await?;
///
/// let res = db.query("SELECT now() AS ts", &[], &QueryOptions::new()).await?;
/// ```
pub struct Database<D: Driver = PgDriver> {
    inner: Arc<Shared<D>>,
}

impl<D: Driver> Clone for Database<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("column_case", &self.inner.column_case)
            .field("audit_setting", &self.inner.audit_setting)
            .finish_non_exhaustive()
    }
}

impl Database<PgDriver> {
    /// Build a pooled database handle without TLS. Connections are opened
    /// lazily on first use.
    pub fn connect(config: DatabaseConfig) -> CrudResult<Self> {
        let pool = create_pool(&config)?;
        Ok(Self::from_pool(pool, config))
    }

    /// Build a pooled database handle using a TLS connector.
    pub fn connect_with_tls<T>(config: DatabaseConfig, tls: T) -> CrudResult<Self>
    where
        T: MakeTlsConnect<Socket> + Clone + Sync + Send + 'static,
        T::Stream: Sync + Send,
        T::TlsConnect: Sync + Send,
        <T::TlsConnect as TlsConnect<Socket>>::Future: Send,
    {
        let pool = create_pool_with_tls(&config, tls)?;
        Ok(Self::from_pool(pool, config))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool, config: DatabaseConfig) -> Self {
        let driver = PgDriver::new(pool, config.on_pool_error.clone());
        Self::with_driver(driver, config)
    }

    pub fn pool(&self) -> &Pool {
        self.inner.driver.pool()
    }
}

impl<D: Driver> Database<D> {
    /// Build a handle over any [`Driver`]. Only the logger, column case and
    /// audit setting are taken from `config`.
    pub fn with_driver(driver: D, config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(Shared {
                driver,
                logger: config.logger,
                column_case: config.column_case,
                audit_setting: config.audit_setting,
            }),
        }
    }

    pub fn driver(&self) -> &D {
        &self.inner.driver
    }

    pub fn column_case(&self) -> ColumnCase {
        self.inner.column_case
    }

    /// Session setting written by audited transactions.
    pub fn audit_setting(&self) -> &str {
        &self.inner.audit_setting
    }

    pub(crate) fn logger(&self) -> &dyn QueryLogger {
        self.inner.logger.as_ref()
    }

    /// Run arbitrary SQL.
    ///
    /// With `opts.audit_user_id` set the statement runs inside its own audit
    /// transaction.
    pub async fn query(&self, sql: &str, params: &[Value], opts: &QueryOptions) -> CrudResult<QueryResult> {
        self.execute(Target::Pool, sql, params, opts).await
    }

    /// [`query`](Self::query) with the audit user id filled in.
    pub async fn audited_query(
        &self,
        user_id: impl Into<String>,
        sql: &str,
        params: &[Value],
        opts: &QueryOptions,
    ) -> CrudResult<QueryResult> {
        let opts = opts.clone().audit_user_id(user_id);
        self.execute(Target::Pool, sql, params, &opts).await
    }

    /// Start a transaction on a dedicated connection, optionally recording
    /// `audit_user_id` for the triggers that read the audit setting.
    pub async fn begin(&self, audit_user_id: Option<&str>) -> CrudResult<Transaction<D>> {
        Transaction::begin(self.clone(), audit_user_id).await
    }

    /// CRUD helpers bound to `name` (optionally schema-qualified).
    pub fn table(&self, name: &str) -> CrudResult<Table<'static, D>> {
        Table::new(self.clone(), Target::Pool, name)
    }
}
