//! In-memory adapters for the ledger ports
//!
//! Used by tests and by tooling that runs the engine without a database.

pub mod catalog;
pub mod memory;

pub use catalog::InMemoryProductCatalog;
pub use memory::{Faults, InMemoryLedgerStore, MemoryUnitOfWork};
