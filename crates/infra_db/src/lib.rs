//! Infrastructure Database Layer
//!
//! PostgreSQL persistence for the journal ledger using SQLx.
//!
//! # Architecture
//!
//! - [`repositories`] holds the SQL and row types, one free function per
//!   statement, each taking a `&mut PgConnection` so it runs inside whatever
//!   transaction the caller holds.
//! - [`adapters`] implements the domain ports (`LedgerStore`,
//!   `ProductCostLookup`) on top of the repositories.
//!
//! Posting guarantees that the domain relies on are also enforced by the
//! schema: one posted entry per source document, unique entry numbers and
//! one-sided lines.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedgerStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/ledger")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresLedgerStore::new(pool, Currency::IDR);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, DatabaseConfig, create_pool, run_migrations};
pub use error::DatabaseError;
pub use adapters::{PostgresLedgerStore, PostgresProductCatalog, PostgresUnitOfWork};
pub use repositories::ProductRepository;
