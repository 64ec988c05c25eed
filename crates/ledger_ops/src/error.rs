//! Operator error handling

use thiserror::Error;

use domain_ledger::LedgerError;
use infra_db::DatabaseError;

/// Errors surfaced by the operator commands
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Unknown account code: {0}")]
    UnknownAccount(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<core_kernel::PortError> for OpsError {
    fn from(err: core_kernel::PortError) -> Self {
        OpsError::Ledger(LedgerError::from(err))
    }
}
