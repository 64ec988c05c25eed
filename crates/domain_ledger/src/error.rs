//! Ledger domain errors

use rust_decimal::Decimal;
use thiserror::Error;

use core_kernel::{CoreError, MoneyError, PortError};

/// Errors that can occur in the ledger domain
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Input or mapping problem detected before anything was written
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Entry not balanced beyond the configured tolerance
    #[error("Entry not balanced: debits={debits}, credits={credits}, difference={difference}")]
    Unbalanced {
        debits: Decimal,
        credits: Decimal,
        difference: Decimal,
    },

    /// A referenced account or document does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: String,
        id: String,
    },

    /// A posted entry already exists for the source document
    #[error("Posted journal already exists for {source_type} {source_id}")]
    Conflict {
        source_type: String,
        source_id: String,
    },

    /// Every entry-number attempt collided with an existing entry
    #[error("Could not allocate a unique entry number after {attempts} attempts")]
    EntryNumberExhausted {
        attempts: u32,
    },

    /// A read-side diagnostic did not finish before its deadline
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// Storage port failure
    #[error(transparent)]
    Port(#[from] PortError),

    /// Money arithmetic failure
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// Kernel error
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Coarse classification used by callers deciding how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Infrastructure,
}

impl LedgerError {
    /// Creates a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Creates a validation error naming the offending field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a not-found error
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates a conflict error for a source document
    pub fn conflict(source_type: impl ToString, source_id: impl ToString) -> Self {
        LedgerError::Conflict {
            source_type: source_type.to_string(),
            source_id: source_id.to_string(),
        }
    }

    /// Classifies the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation { .. }
            | LedgerError::Unbalanced { .. }
            | LedgerError::Money(_) => ErrorKind::Validation,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Conflict { .. } => ErrorKind::Conflict,
            LedgerError::Core(_) => ErrorKind::Validation,
            LedgerError::Port(PortError::NotFound { .. }) => ErrorKind::NotFound,
            LedgerError::Port(PortError::Validation { .. }) => ErrorKind::Validation,
            LedgerError::Port(PortError::Conflict { .. }) => ErrorKind::Conflict,
            _ => ErrorKind::Infrastructure,
        }
    }

    /// Returns true for validation failures
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Returns true for missing accounts or documents
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Returns true for posted-entry conflicts
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}
