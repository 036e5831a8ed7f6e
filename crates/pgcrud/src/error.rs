//! Error types for pgcrud

use thiserror::Error;

/// Result type alias for pgcrud operations
pub type CrudResult<T> = Result<T, CrudError>;

/// Error types for database operations
#[derive(Debug, Error)]
pub enum CrudError {
    /// Any failure raised by the driver (connectivity, constraints, syntax).
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Pool checkout or construction failure
    #[error("Pool error: {0}")]
    Pool(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A conditional insert/upsert matched more than one existing row.
    #[error("Invalid condition on '{table}': expected at most 1 matching row, found {matched}")]
    InvalidCondition { table: String, matched: usize },

    /// Validation error (identifiers, payload shape, unsafe statements)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Payload serialization error
    #[error("Encode error: {0}")]
    Encode(String),

    /// A single-row statement returned a different number of rows
    #[error("Expected {expected} row(s), got {got}")]
    UnexpectedRowCount { expected: usize, got: usize },
}

impl CrudError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Check if this is an ambiguous-condition error
    pub fn is_invalid_condition(&self) -> bool {
        matches!(self, Self::InvalidCondition { .. })
    }

    /// The SQLSTATE code reported by the server, if any.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Database(err) => err.code().map(|c| c.code()),
            _ => None,
        }
    }

    /// Check if this is a unique violation (SQLSTATE 23505)
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate() == Some("23505")
    }
}

impl From<deadpool_postgres::PoolError> for CrudError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Backend(e) => Self::Database(e),
            other => Self::Pool(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CrudError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}
