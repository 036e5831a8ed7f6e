//! # pgcrud
//!
//! Table-scoped CRUD helpers over `tokio-postgres`, with audited writes.
//!
//! ## Features
//!
//! - **Explicit handle**: a cloneable [`Database`] replaces any global pool
//! - **Table helpers**: `get_by_id`, `find`, `insert`, `update`, `upsert`, `delete`, ...
//! - **Safe placeholders**: condition fragments keep their own `$1..$k`
//!   numbering and are shifted without touching string literals or comments
//! - **Audited writes**: writes can run in a transaction that records the
//!   acting user in a session setting read by database triggers
//! - **Guaranteed release**: transactional connections go back to the pool
//!   (or are detached from it) on every exit path
//! - **Statement logging**: every statement reaches a [`QueryLogger`] once
//!
//! ## Example
//!
//! ```ignore
//! use pgcrud::{Database, DatabaseConfig, TracingLogger, Where};
//! use serde_json::json;
//!
//! let db = Database::connect(DatabaseConfig::from_env()?.logger(TracingLogger::new()))?;
//! let products = db.table("products")?;
//!
//! let row = products.insert(&json!({"name": "a", "price": 1})).await?;
//! products.update(&json!({"price": 2}), Where::new("id = $1", [row["id"].clone()])).await?;
//!
//! // Audited: BEGIN, set_config('audit.user_id', 'user-42', true), DELETE, COMMIT
//! products.audited("user-42").delete(Where::eq("id", row["id"].clone())).await?;
//! ```

pub mod condition;
pub mod config;
pub mod database;
pub mod driver;
pub mod error;
pub mod executor;
mod ident;
pub mod monitor;
pub mod placeholder;
pub mod pool;
pub mod statement;
pub mod table;
pub mod transaction;
pub mod value;

pub use condition::Where;
pub use config::{ColumnCase, DatabaseConfig, PoolErrorHandler};
pub use database::Database;
pub use driver::{Driver, DriverConnection, PgConnection, PgDriver, QueryOutput};
pub use error::{CrudError, CrudResult};
pub use executor::{QueryOptions, QueryResult};
pub use monitor::{
    Command, CompositeLogger, FnLogger, NoopLogger, QueryLogger, QueryStats, StatsLogger,
    StatsSnapshot, TracingLogger,
};
pub use pool::{create_pool, create_pool_with_tls};
pub use statement::Statement;
pub use table::{AuditedTable, Table, WriteOutcome};
pub use transaction::Transaction;
pub use value::{JsonParam, Record};
