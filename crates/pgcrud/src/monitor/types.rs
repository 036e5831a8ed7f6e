use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// The kind of SQL statement that was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
    /// DDL, `SET`, function calls and anything else.
    Other,
}

impl Command {
    /// Detect the command kind from SQL text.
    ///
    /// For CTEs (`WITH ...`), looks past the CTE definitions to find the
    /// outer DML keyword.
    pub fn from_sql(sql: &str) -> Self {
        let trimmed = strip_sql_prefix(sql);
        if starts_with_keyword(trimmed, "SELECT") {
            Command::Select
        } else if starts_with_keyword(trimmed, "INSERT") {
            Command::Insert
        } else if starts_with_keyword(trimmed, "UPDATE") {
            Command::Update
        } else if starts_with_keyword(trimmed, "DELETE") {
            Command::Delete
        } else if starts_with_keyword(trimmed, "WITH") {
            Self::detect_cte_dml(trimmed)
        } else {
            Command::Other
        }
    }

    /// The statement keyword, upper-cased.
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Select => "SELECT",
            Command::Insert => "INSERT",
            Command::Update => "UPDATE",
            Command::Delete => "DELETE",
            Command::Other => "OTHER",
        }
    }

    fn detect_cte_dml(sql: &str) -> Self {
        // The outer statement follows the last top-level closing paren.
        let mut depth: i32 = 0;
        let mut last_top_level = 0;
        let bytes = sql.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        last_top_level = i + 1;
                    }
                }
                b'\'' => {
                    i += 1;
                    while i < bytes.len() {
                        if bytes[i] == b'\'' {
                            if bytes.get(i + 1) == Some(&b'\'') {
                                i += 1;
                            } else {
                                break;
                            }
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        let remainder = sql[last_top_level..].trim_start();
        if starts_with_keyword(remainder, "INSERT") {
            Command::Insert
        } else if starts_with_keyword(remainder, "UPDATE") {
            Command::Update
        } else if starts_with_keyword(remainder, "DELETE") {
            Command::Delete
        } else {
            Command::Select
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip leading whitespace, comments and parentheses.
fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            match s.find('\n') {
                Some(pos) => {
                    s = &s[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => {
                    s = &s[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            break;
        }
    }
    s
}

fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    let Some(head) = s.get(..keyword.len()) else {
        return false;
    };
    if !head.eq_ignore_ascii_case(keyword) {
        return false;
    }
    s[keyword.len()..]
        .chars()
        .next()
        .is_none_or(|c| !(c.is_ascii_alphanumeric() || c == '_'))
}

/// Statistics handed to a [`QueryLogger`] once per executed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStats {
    /// Statement kind.
    pub command: Command,
    /// Wall-clock time including any audit transaction round trips.
    pub took: Duration,
    /// Returned or affected row count (0 on failure).
    pub rows: u64,
    /// Caller label with quote characters stripped.
    pub alias: Option<String>,
    /// Audit user id, when the statement ran as an audited write.
    pub audit: Option<String>,
    /// Whether the statement failed.
    pub failed: bool,
}

impl QueryStats {
    /// Elapsed time in whole milliseconds.
    pub fn took_ms(&self) -> u128 {
        self.took.as_millis()
    }
}

/// Receives every statement executed through a [`Database`](crate::Database).
///
/// Implementations must be cheap; they run inline after each statement. A
/// panic inside `log` is caught and reported, it never reaches the caller.
pub trait QueryLogger: Send + Sync {
    fn log(&self, sql: &str, params: &[Value], stats: &QueryStats);
}

impl<T: QueryLogger + ?Sized> QueryLogger for std::sync::Arc<T> {
    fn log(&self, sql: &str, params: &[Value], stats: &QueryStats) {
        (**self).log(sql, params, stats)
    }
}
