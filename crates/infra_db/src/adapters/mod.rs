//! Domain Adapters
//!
//! Implementations of the ledger ports on PostgreSQL. Adapters translate
//! between domain models and the row types of [`crate::repositories`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::{PostgresLedgerStore, PostgresProductCatalog};
//! use domain_ledger::JournalService;
//!
//! let store = Arc::new(PostgresLedgerStore::new(pool.clone(), Currency::IDR));
//! let catalog = Arc::new(PostgresProductCatalog::new(pool));
//! let service = JournalService::new(store, catalog, LedgerSettings::default());
//! ```

pub mod catalog;
pub mod ledger;

pub use catalog::PostgresProductCatalog;
pub use ledger::{PostgresLedgerStore, PostgresUnitOfWork};
