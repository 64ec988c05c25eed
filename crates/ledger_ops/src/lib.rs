//! Ledger Operations
//!
//! Operator-facing commands over the ledger: read-only integrity
//! verification, reconciliation towards a chosen source of truth, and the
//! periodic verify-then-repair loop. The `ledger-reconciler` binary wires
//! these to PostgreSQL.
//!
//! # Example
//!
//! ```rust,ignore
//! use ledger_ops::{LedgerOpsConfig, Runner};
//!
//! let config = LedgerOpsConfig::from_env()?;
//! let runner = Runner::new(store, &config);
//! let report = runner.verify().await?;
//! ```

pub mod config;
pub mod error;
pub mod runner;

pub use config::LedgerOpsConfig;
pub use error::OpsError;
pub use runner::{describe_report, ReconcileRequest, Runner};
