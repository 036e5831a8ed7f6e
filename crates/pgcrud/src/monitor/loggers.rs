use super::truncate_sql_bytes;
use super::types::{Command, QueryLogger, QueryStats};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::Level;

/// A logger that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl QueryLogger for NoopLogger {
    fn log(&self, _sql: &str, _params: &[Value], _stats: &QueryStats) {}
}

/// Adapts a closure into a [`QueryLogger`].
///
/// ```ignore
/// let config = DatabaseConfig::new().logger(FnLogger(|sql: &str, _: &[Value], stats: &QueryStats| {
///     println!("{} {}ms", sql, stats.took_ms());
/// }));
/// ```
#[derive(Clone)]
pub struct FnLogger<F>(pub F);

impl<F> QueryLogger for FnLogger<F>
where
    F: Fn(&str, &[Value], &QueryStats) + Send + Sync,
{
    fn log(&self, sql: &str, params: &[Value], stats: &QueryStats) {
        (self.0)(sql, params, stats)
    }
}

/// Emits one `tracing` event per statement on the `pgcrud.sql` target.
///
/// Successful statements are emitted at `level` (debug by default), failed
/// ones always at `WARN`. Parameter values are never logged, only their count.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    /// Tracing event level for successful statements.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }
}

impl QueryLogger for TracingLogger {
    fn log(&self, sql: &str, params: &[Value], stats: &QueryStats) {
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let sql = self.truncate_sql(sql);
        let alias = stats.alias.as_deref().unwrap_or("-");
        let audit = stats.audit.as_deref().unwrap_or("-");
        let level = if stats.failed { Level::WARN } else { self.level };
        emit_at_level!(
            level,
            target: "pgcrud.sql",
            command = %stats.command,
            took_ms = stats.took_ms() as u64,
            rows = stats.rows,
            alias,
            audit,
            failed = stats.failed,
            param_count = params.len(),
            sql = %sql,
        );
    }
}

/// Fans a statement out to several loggers, in insertion order.
#[derive(Clone, Default)]
pub struct CompositeLogger {
    loggers: Vec<Arc<dyn QueryLogger>>,
}

impl CompositeLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, logger: impl QueryLogger + 'static) -> Self {
        self.loggers.push(Arc::new(logger));
        self
    }

    pub fn add_arc(mut self, logger: Arc<dyn QueryLogger>) -> Self {
        self.loggers.push(logger);
        self
    }
}

impl QueryLogger for CompositeLogger {
    fn log(&self, sql: &str, params: &[Value], stats: &QueryStats) {
        for logger in &self.loggers {
            super::log_isolated(logger.as_ref(), sql, params, stats);
        }
    }
}

/// Aggregates statement counts and timings.
#[derive(Debug, Default)]
pub struct StatsLogger {
    total: AtomicU64,
    failed: AtomicU64,
    audited: AtomicU64,
    select: AtomicU64,
    insert: AtomicU64,
    update: AtomicU64,
    delete: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
    slowest: Mutex<Option<String>>,
}

/// Snapshot of a [`StatsLogger`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsSnapshot {
    pub total: u64,
    pub failed: u64,
    pub audited: u64,
    pub select: u64,
    pub insert: u64,
    pub update: u64,
    pub delete: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
    /// Alias (or SQL, when no alias was given) of the slowest statement.
    pub slowest: Option<String>,
}

impl StatsLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            audited: self.audited.load(Ordering::Relaxed),
            select: self.select.load(Ordering::Relaxed),
            insert: self.insert.load(Ordering::Relaxed),
            update: self.update.load(Ordering::Relaxed),
            delete: self.delete.load(Ordering::Relaxed),
            total_duration: Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed)),
            max_duration: Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed)),
            slowest: self
                .slowest
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone(),
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.total,
            &self.failed,
            &self.audited,
            &self.select,
            &self.insert,
            &self.update,
            &self.delete,
            &self.total_nanos,
            &self.max_nanos,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *self
            .slowest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

impl QueryLogger for StatsLogger {
    fn log(&self, sql: &str, _params: &[Value], stats: &QueryStats) {
        self.total.fetch_add(1, Ordering::Relaxed);
        if stats.failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        if stats.audit.is_some() {
            self.audited.fetch_add(1, Ordering::Relaxed);
        }
        match stats.command {
            Command::Select => self.select.fetch_add(1, Ordering::Relaxed),
            Command::Insert => self.insert.fetch_add(1, Ordering::Relaxed),
            Command::Update => self.update.fetch_add(1, Ordering::Relaxed),
            Command::Delete => self.delete.fetch_add(1, Ordering::Relaxed),
            Command::Other => 0,
        };

        let nanos = u64::try_from(stats.took.as_nanos()).unwrap_or(u64::MAX);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        if self.max_nanos.fetch_max(nanos, Ordering::Relaxed) < nanos {
            let label = stats.alias.clone().unwrap_or_else(|| sql.to_string());
            *self
                .slowest
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(label);
        }
    }
}
