//! Kernel error type shared by the ledger crates

use thiserror::Error;

use crate::money::MoneyError;

/// Errors raised by kernel value types and the enums built on them
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Money(#[from] MoneyError),

    /// A stored or user-supplied code that maps to no known variant
    #[error("unknown {kind} '{value}'")]
    UnknownCode { kind: &'static str, value: String },

    #[error("validation failed: {0}")]
    Validation(String),

    /// A journal entry was asked to move between statuses it cannot
    #[error("illegal status change: {0}")]
    IllegalStatusChange(String),
}

impl CoreError {
    pub fn unknown_code(kind: &'static str, value: impl Into<String>) -> Self {
        CoreError::UnknownCode {
            kind,
            value: value.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn illegal_status_change(message: impl Into<String>) -> Self {
        CoreError::IllegalStatusChange(message.into())
    }
}
