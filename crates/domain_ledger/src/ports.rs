//! Port interfaces for the ledger domain
//!
//! These traits define the contracts the ledger needs from storage. The
//! PostgreSQL implementation lives in `infra_db`; an in-memory implementation
//! lives in [`crate::adapters`].
//!
//! # Unit of work
//!
//! Every posting, deletion or reconciliation step runs inside one
//! [`LedgerUnitOfWork`] obtained from [`LedgerStore::begin`]. A failed
//! statement does not poison the unit of work, so callers can compensate or
//! continue with best-effort steps before deciding to commit or roll back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{
    AccountId, CashBankId, DomainPort, JournalEntryId, Money, PortError, ProductId, SourceId,
};

use crate::account::{Account, CashBankAccount};
use crate::journal::{JournalEntry, JournalLine, SourceType};

/// Storage constraint: one posted entry per source document
pub const POSTED_SOURCE_CONSTRAINT: &str = "uq_journal_entries_posted_source";

/// Storage constraint: unique entry numbers
pub const ENTRY_NUMBER_CONSTRAINT: &str = "uq_journal_entries_entry_number";

/// Account lookups needed while building and propagating entries
#[async_trait]
pub trait AccountDirectory: Send {
    /// Finds an account by code
    async fn account_by_code(&mut self, code: &str) -> Result<Option<Account>, PortError>;

    /// Finds an account by id
    async fn account_by_id(&mut self, id: AccountId) -> Result<Option<Account>, PortError>;

    /// Direct children of an account
    async fn children_of(&mut self, parent_id: AccountId) -> Result<Vec<Account>, PortError>;

    /// Finds a cash/bank register by id
    async fn cash_bank_by_id(&mut self, id: CashBankId) -> Result<Option<CashBankAccount>, PortError>;

    /// The register mirroring `account_id`, if any
    async fn cash_bank_for_account(&mut self, account_id: AccountId) -> Result<Option<CashBankAccount>, PortError>;
}

/// Posted debit and credit totals for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineTotals {
    pub account_id: AccountId,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl LineTotals {
    pub fn net(&self) -> Decimal {
        self.debit - self.credit
    }
}

/// A posted entry that does not balance
///
/// Totals are the sums of the entry's lines; the entry is reported when they
/// differ or when its stored header totals differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnbalancedEntry {
    pub entry_id: JournalEntryId,
    pub entry_number: String,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
}

/// More than one posted entry for a source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicatePosting {
    pub source_type: SourceType,
    pub source_id: SourceId,
    pub entry_count: i64,
}

/// One storage transaction
#[async_trait]
pub trait LedgerUnitOfWork: AccountDirectory {
    /// Existing entry for a source document, posted or draft
    async fn find_entry_by_source(&mut self, source_type: SourceType, source_id: SourceId) -> Result<Option<JournalEntry>, PortError>;

    /// Inserts an entry header
    ///
    /// # Errors
    ///
    /// `PortError::Conflict` naming [`ENTRY_NUMBER_CONSTRAINT`] or
    /// [`POSTED_SOURCE_CONSTRAINT`] when a uniqueness rule rejects the row
    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError>;

    /// Inserts one line
    async fn insert_line(&mut self, line: &JournalLine) -> Result<(), PortError>;

    /// Flips a draft entry to posted
    async fn mark_posted(&mut self, entry_id: JournalEntryId, posted_at: DateTime<Utc>, posted_by: &str) -> Result<(), PortError>;

    /// Lines of an entry ordered by line number
    async fn lines_for_entry(&mut self, entry_id: JournalEntryId) -> Result<Vec<JournalLine>, PortError>;

    /// Deletes every line of an entry, returning how many were removed
    async fn delete_lines(&mut self, entry_id: JournalEntryId) -> Result<u64, PortError>;

    /// Deletes an entry header
    async fn delete_entry(&mut self, entry_id: JournalEntryId) -> Result<(), PortError>;

    /// Loads accounts and holds them against other balance writers until the
    /// unit of work ends
    ///
    /// Rows are locked in id order. Missing ids are left out of the result.
    async fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<Vec<Account>, PortError>;

    async fn lock_account(&mut self, id: AccountId) -> Result<Option<Account>, PortError> {
        Ok(self.lock_accounts(&[id]).await?.into_iter().next())
    }

    /// Overwrites the cached balance of an account
    async fn save_account_balance(&mut self, account_id: AccountId, balance: &Money) -> Result<(), PortError>;

    /// Overwrites the mirrored balance of a cash/bank register
    async fn save_cash_bank_balance(&mut self, cash_bank_id: CashBankId, balance: &Money) -> Result<(), PortError>;

    /// Every account in code order
    async fn list_accounts(&mut self) -> Result<Vec<Account>, PortError>;

    /// Every cash/bank register in code order
    async fn list_cash_banks(&mut self) -> Result<Vec<CashBankAccount>, PortError>;

    /// Posted totals for every account that has at least one line
    async fn posted_line_totals(&mut self) -> Result<Vec<LineTotals>, PortError>;

    /// Posted totals for one account; zero when it has no lines
    async fn posted_totals_for(&mut self, account_id: AccountId) -> Result<LineTotals, PortError>;

    /// Sum of the register's own transaction amounts
    async fn subledger_transaction_sum(&mut self, cash_bank_id: CashBankId) -> Result<Decimal, PortError>;

    /// Posted entries whose lines or header totals do not balance
    async fn unbalanced_posted_entries(&mut self) -> Result<Vec<UnbalancedEntry>, PortError>;

    /// Sources with more than one posted entry
    async fn duplicate_posted_sources(&mut self) -> Result<Vec<DuplicatePosting>, PortError>;

    /// Commits the transaction
    async fn commit(self: Box<Self>) -> Result<(), PortError>;

    /// Rolls the transaction back
    async fn rollback(self: Box<Self>) -> Result<(), PortError>;
}

/// Entry point to ledger storage
#[async_trait]
pub trait LedgerStore: DomainPort {
    /// Starts a unit of work
    async fn begin(&self) -> Result<Box<dyn LedgerUnitOfWork>, PortError>;
}

/// Unit cost of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCost {
    pub product_id: ProductId,
    pub name: String,
    pub unit_cost: Decimal,
}

/// Product cost source for COGS lines
#[async_trait]
pub trait ProductCostLookup: DomainPort {
    /// Cost of one unit, or `None` if the product is unknown
    async fn unit_cost(&self, product_id: ProductId) -> Result<Option<ProductCost>, PortError>;
}
