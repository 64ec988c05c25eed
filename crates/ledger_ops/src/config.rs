//! Operator configuration
//!
//! Read from environment variables prefixed `LEDGER_`; nested keys use `__`:
//!
//! ```text
//! LEDGER_DATABASE_URL=postgres://ledger@localhost/ledger
//! LEDGER_RECONCILIATION__TOLERANCE=0.01
//! LEDGER_RECONCILIATION__INTERVAL_SECS=600
//! LEDGER_LEDGER__CURRENCY=IDR
//! ```

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use validator::{Validate, ValidationError};

use domain_ledger::{LedgerSettings, ReconciliationSettings};

use crate::error::OpsError;

/// Configuration for `ledger-reconciler`
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_settings"))]
pub struct LedgerOpsConfig {
    /// PostgreSQL connection string
    #[validate(length(min = 1))]
    pub database_url: String,
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,
    /// Apply embedded migrations before running
    pub run_migrations: bool,
    /// Default tracing filter; `RUST_LOG` wins when set
    pub log_level: String,
    /// Emit JSON log lines
    pub log_json: bool,
    /// Deadline for one verification pass
    #[validate(range(min = 1))]
    pub verify_timeout_secs: u64,
    pub ledger: LedgerSettings,
    pub reconciliation: ReconciliationSettings,
}

impl Default for LedgerOpsConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/ledger".to_string(),
            max_connections: 5,
            run_migrations: false,
            log_level: "info".to_string(),
            log_json: false,
            verify_timeout_secs: 300,
            ledger: LedgerSettings::default(),
            reconciliation: ReconciliationSettings::default(),
        }
    }
}

impl LedgerOpsConfig {
    /// Loads configuration from `LEDGER_*` environment variables
    pub fn from_env() -> Result<Self, OpsError> {
        let source = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("LEDGER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Self::from_config(source)
    }

    /// Deserializes and validates an already assembled configuration
    pub fn from_config(source: config::Config) -> Result<Self, OpsError> {
        let config: Self = source.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

fn validate_settings(config: &LedgerOpsConfig) -> Result<(), ValidationError> {
    if config.reconciliation.tolerance < Decimal::ZERO {
        return Err(ValidationError::new("negative_reconciliation_tolerance"));
    }
    if config.reconciliation.interval_secs == 0 {
        return Err(ValidationError::new("zero_sync_interval"));
    }
    if config.ledger.balancing_tolerance < Decimal::ZERO || config.ledger.materiality_threshold < Decimal::ZERO {
        return Err(ValidationError::new("negative_ledger_threshold"));
    }
    if config.ledger.max_hierarchy_depth == 0 {
        return Err(ValidationError::new("zero_hierarchy_depth"));
    }
    Ok(())
}
