//! Error types for pgrecord

use crate::validate::ValidationErrors;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for pgrecord operations
pub type RecordResult<T> = Result<T, RecordError>;

/// Error types for validation, compilation and database operations
#[derive(Debug, Error)]
pub enum RecordError {
    /// One record failed field validation. Every offending field is listed.
    #[error("Validation error in record {record}:\n{errors}")]
    Validation {
        record: usize,
        errors: ValidationErrors,
    },

    /// A value could not be converted to the declared column type
    #[error("Type mismatch: cannot convert {found} to {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Batch could not be compiled into statements
    #[error("Compilation error: {0}")]
    Compilation(String),

    /// Malformed filter argument in the query builder
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Schema definition violates a descriptor invariant
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Statement execution failed; the remaining work of the unit was aborted
    #[error("Execution error in {action} on '{table}': {source}")]
    Execution {
        action: &'static str,
        table: String,
        #[source]
        source: Box<RecordError>,
    },

    /// Begin/commit/rollback failure or misuse of a transaction session
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Referenced table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Unique constraint violation
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation
    #[error("Check constraint violation: {0}")]
    CheckViolation(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Pool error
    #[error("Pool error: {0}")]
    Pool(String),

    /// Connection acquisition or transaction exceeded its time bound
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// Configuration could not be loaded
    #[error("Config error: {0}")]
    Config(String),
}

/// Classified connection failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The target database does not exist (SQLSTATE 3D000).
    #[error("database '{0}' does not exist")]
    DatabaseNotFound(String),

    /// Any other connectivity failure.
    #[error("{0}")]
    Unavailable(String),
}

/// Malformed argument for a set or range filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("{op} filter on '{column}' requires a list argument")]
    NotASequence { column: String, op: &'static str },

    #[error("{op} filter on '{column}' received an empty list")]
    EmptySequence { column: String, op: &'static str },

    #[error("{op} filter on '{column}' requires exactly two bounds, got {got}")]
    IncompleteRange {
        column: String,
        op: &'static str,
        got: usize,
    },
}

impl RecordError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a compilation error
    pub fn compilation(message: impl Into<String>) -> Self {
        Self::Compilation(message.into())
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// The classified database error behind an execution failure, or `self`.
    pub fn cause(&self) -> &RecordError {
        match self {
            Self::Execution { source, .. } => source.cause(),
            other => other,
        }
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        matches!(self.cause(), Self::UniqueViolation(_))
    }

    /// Check if this is a foreign key violation error
    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self.cause(), Self::ForeignKeyViolation(_))
    }

    /// Check if this is a check constraint violation error
    pub fn is_check_violation(&self) -> bool {
        matches!(self.cause(), Self::CheckViolation(_))
    }

    /// Check if the statement referenced a missing table
    pub fn is_table_not_found(&self) -> bool {
        matches!(self.cause(), Self::TableNotFound(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Field errors carried by a validation failure, if any.
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// Parse a tokio_postgres error into a more specific RecordError
    pub fn from_db_error(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let constraint = db_err.constraint().unwrap_or("unknown");
            let message = db_err.message();

            match db_err.code().code() {
                "23505" => return Self::UniqueViolation(format!("{}: {}", constraint, message)),
                "23503" => {
                    return Self::ForeignKeyViolation(format!("{}: {}", constraint, message));
                }
                "23514" => return Self::CheckViolation(format!("{}: {}", constraint, message)),
                "42P01" => return Self::TableNotFound(message.to_string()),
                _ => {}
            }
        }
        Self::Query(err)
    }

    /// Classify a pool failure while acquiring a connection to `database`.
    pub fn from_pool_error(database: &str, err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Backend(e) => Self::from_connect_error(database, &e),
            deadpool_postgres::PoolError::Timeout(_) => Self::Connection(
                ConnectionError::Unavailable(format!("timed out connecting to '{database}'")),
            ),
            other => Self::Pool(other.to_string()),
        }
    }

    /// Classify a failure that happened while connecting to `database`.
    pub fn from_connect_error(database: &str, err: &tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            if db_err.code().code() == "3D000" {
                return Self::Connection(ConnectionError::DatabaseNotFound(database.to_string()));
            }
        }
        Self::Connection(ConnectionError::Unavailable(err.to_string()))
    }
}
