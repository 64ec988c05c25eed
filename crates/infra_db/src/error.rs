//! PostgreSQL failures and their mapping onto [`PortError`]

use std::fmt;

use thiserror::Error;

use core_kernel::PortError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("cannot reach database: {0}")]
    ConnectionFailed(String),

    #[error("no pooled connection became free in time")]
    PoolExhausted,

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// SQLSTATE 23505; `constraint` is the index name
    #[error("unique violation: {message}")]
    UniqueViolation {
        message: String,
        constraint: Option<String>,
    },

    /// SQLSTATE 23503
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// SQLSTATE 23514, e.g. a line with both sides set
    #[error("check violation: {message}")]
    CheckViolation {
        message: String,
        constraint: Option<String>,
    },

    /// SQLSTATE 25P02: a statement failed earlier and was not rolled back
    /// to a savepoint
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("migration failed: {0}")]
    Migration(String),

    /// A column value that maps onto no domain value
    #[error("cannot decode {column}: {reason}")]
    Decode { column: String, reason: String },

    #[error("statement failed: {0}")]
    Statement(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl DatabaseError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        DatabaseError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn decode(column: &str, reason: impl fmt::Display) -> Self {
        DatabaseError::Decode {
            column: column.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Constraint named by PostgreSQL for unique and check violations
    pub fn constraint(&self) -> Option<&str> {
        match self {
            DatabaseError::UniqueViolation { constraint, .. }
            | DatabaseError::CheckViolation { constraint, .. } => constraint.as_deref(),
            _ => None,
        }
    }

    fn from_database(db_err: &dyn sqlx::error::DatabaseError) -> Self {
        let message = db_err.message().to_string();
        let constraint = db_err.constraint().map(str::to_string);
        // https://www.postgresql.org/docs/current/errcodes-appendix.html
        match db_err.code().as_deref() {
            Some("23505") => DatabaseError::UniqueViolation { message, constraint },
            Some("23503") => DatabaseError::ForeignKeyViolation(message),
            Some("23514") => DatabaseError::CheckViolation { message, constraint },
            Some("25P02") => DatabaseError::TransactionAborted(message),
            _ => DatabaseError::Statement(message),
        }
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::Database(db_err) => DatabaseError::from_database(&*db_err),
            sqlx::Error::RowNotFound => DatabaseError::not_found("row", "?"),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Io(e) => DatabaseError::ConnectionFailed(e.to_string()),
            other => DatabaseError::Sqlx(other),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::Migration(error.to_string())
    }
}

/// Unique violations keep their constraint name so the poster can tell an
/// entry-number collision from a second posting of the same document.
impl From<DatabaseError> for PortError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound { entity, id } => PortError::not_found(entity, id),
            DatabaseError::UniqueViolation { message, constraint } => PortError::Conflict { message, constraint },
            DatabaseError::CheckViolation { message, constraint } => PortError::Validation {
                message,
                field: constraint,
            },
            DatabaseError::ForeignKeyViolation(message) => PortError::validation(message),
            DatabaseError::ConnectionFailed(message) => PortError::unavailable(message),
            DatabaseError::PoolExhausted => PortError::unavailable("connection pool exhausted"),
            other => PortError::internal(other.to_string()),
        }
    }
}
