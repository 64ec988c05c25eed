//! Storage-facing vocabulary shared by the ledger ports
//!
//! `domain_ledger` declares the traits the posting and reconciliation code
//! needs (`LedgerStore`, `LedgerUnitOfWork`, `ProductCostLookup`); `infra_db`
//! and the in-memory store implement them. Both sides speak the types in
//! this module, so neither depends on the other.
//!
//! ```rust,ignore
//! #[async_trait]
//! pub trait LedgerStore: DomainPort {
//!     async fn begin(&self) -> Result<Box<dyn LedgerUnitOfWork>, PortError>;
//! }
//! ```

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a storage adapter
#[derive(Debug, Error)]
pub enum PortError {
    /// A row the caller named does not exist
    #[error("{entity_type} '{id}' does not exist")]
    NotFound { entity_type: String, id: String },

    /// The store refused the values it was given
    #[error("rejected by store: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// A uniqueness rule was hit.
    ///
    /// `constraint` carries the index name when the adapter knows it; the
    /// poster relies on it to tell a lost posting race from other duplicates.
    #[error("conflict: {message}")]
    Conflict {
        message: String,
        constraint: Option<String>,
    },

    /// The backing store could not be reached
    #[error("store unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("store failure: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Validation failure pinned to one column or field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        PortError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
            constraint: None,
        }
    }

    /// Conflict raised by the named unique index
    pub fn conflict_on(constraint: impl Into<String>, message: impl Into<String>) -> Self {
        PortError::Conflict {
            message: message.into(),
            constraint: Some(constraint.into()),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        PortError::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// True when retrying the same call later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Unavailable { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn conflict_constraint(&self) -> Option<&str> {
        match self {
            PortError::Conflict { constraint, .. } => constraint.as_deref(),
            _ => None,
        }
    }

    pub fn is_conflict_on(&self, constraint: &str) -> bool {
        self.conflict_constraint() == Some(constraint)
    }
}

/// Marker for port implementations; adapters are shared across tasks
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    Unhealthy,
}

/// Outcome of one adapter probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    /// Builds a result from a probe that started at `started`
    pub fn from_probe<E: fmt::Display>(
        adapter_id: impl Into<String>,
        started: Instant,
        probe: Result<(), E>,
    ) -> Self {
        let (status, message) = match probe {
            Ok(()) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(e.to_string())),
        };
        Self {
            adapter_id: adapter_id.into(),
            status,
            latency_ms: started.elapsed().as_millis() as u64,
            message,
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == AdapterHealth::Healthy
    }
}

#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}

/// Who asked for a ledger write
///
/// The actor lands in `journal_entries.posted_by`; callers that leave it
/// empty are recorded as `system`.
#[derive(Debug, Clone, Default)]
pub struct OperationMetadata {
    pub initiated_by: Option<String>,
    /// Free-form reference from the calling module, echoed into logs
    pub correlation_id: Option<String>,
}

impl OperationMetadata {
    pub fn initiated_by(actor: impl Into<String>) -> Self {
        Self {
            initiated_by: Some(actor.into()),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn actor(&self) -> &str {
        self.initiated_by.as_deref().unwrap_or("system")
    }
}
