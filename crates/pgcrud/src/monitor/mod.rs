//! Statement logging.
//!
//! Every statement run through a [`Database`](crate::Database) reaches the
//! configured [`QueryLogger`] exactly once, with the SQL text, the parameters
//! and a [`QueryStats`] record.
//!
//! # Example
//!
//! ```rust,ignore
//! use pgcrud::{DatabaseConfig, TracingLogger};
//!
//! let config = DatabaseConfig::from_env()?.logger(TracingLogger::new());
//! ```

mod loggers;
mod types;


pub use loggers::{CompositeLogger, FnLogger, NoopLogger, StatsLogger, StatsSnapshot, TracingLogger};
pub use types::{Command, QueryLogger, QueryStats};

use serde_json::Value;
use std::panic::{AssertUnwindSafe, catch_unwind};

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

/// Strip quote characters from a caller-supplied alias.
pub(crate) fn clean_alias(alias: &str) -> String {
    alias.chars().filter(|c| !matches!(c, '\'' | '"' | '`')).collect()
}

/// Invoke a logger, containing any panic it raises.
pub(crate) fn log_isolated(logger: &dyn QueryLogger, sql: &str, params: &[Value], stats: &QueryStats) {
    if catch_unwind(AssertUnwindSafe(|| logger.log(sql, params, stats))).is_err() {
        tracing::warn!(
            target: "pgcrud.sql",
            command = %stats.command,
            "query logger panicked; statement outcome is unaffected"
        );
    }
}
