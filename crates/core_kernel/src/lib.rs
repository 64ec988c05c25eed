//! Core Kernel - Foundational types and utilities for the ledger
//!
//! This crate provides the fundamental building blocks used across the workspace:
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers
//! - Port infrastructure shared by the domain and its adapters

pub mod money;
pub mod identifiers;
pub mod error;
pub mod ports;

pub use money::{Money, Currency, MoneyError, MONEY_SCALE};
pub use identifiers::{
    AccountId, CashBankId, JournalEntryId, JournalLineId, SourceId, ProductId,
};
pub use error::CoreError;
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
    OperationMetadata,
};
