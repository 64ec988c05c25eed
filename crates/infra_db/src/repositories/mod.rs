//! Repository implementations
//!
//! SQL and row types for the ledger tables. Queries are built at runtime with
//! `sqlx::query_as` and bound parameters; rows map to domain types through
//! `into_domain` / `From` conversions.

pub mod ledger;
pub mod product;

pub use product::ProductRepository;
