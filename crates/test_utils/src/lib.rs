//! Test Utilities Crate
//!
//! Shared test infrastructure, fixtures and helpers for the ledger test suite.
//!
//! # Modules
//!
//! - `fixtures`: Pre-built test data (amounts, dates, the standard chart)
//! - `builders`: Builders for source documents
//! - `database`: PostgreSQL testcontainer management
//! - `assertions`: Assertion helpers for entries, balances and reports
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;

use once_cell::sync::Lazy;

static TRACING: Lazy<()> = Lazy::new(|| {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
});

/// Installs a test-friendly tracing subscriber once per process
///
/// Honors `RUST_LOG`; defaults to `warn`.
pub fn init_test_tracing() {
    Lazy::force(&TRACING);
}
