//! Ledger Domain - Journal Posting and Balance Reconciliation
//!
//! This crate turns business documents into balanced double-entry journal
//! entries and keeps the cached balance representations consistent with them.
//!
//! # Double-Entry Accounting Principles
//!
//! Every journal entry carries balanced debits and credits:
//! - Debits increase asset/expense accounts
//! - Credits increase liability/equity/revenue accounts
//! - The sum of all debits must equal the sum of all credits
//!
//! # Flow
//!
//! ```text
//! status change -> TransitionController -> JournalBuilder -> LedgerPoster
//!               -> BalancePropagator -> (periodic) ReconciliationEngine
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_ledger::{JournalService, LedgerSettings, SourceDocument};
//!
//! let service = JournalService::new(store, catalog, LedgerSettings::default());
//!
//! // Cash sale of 1,000,000 with 110,000 VAT:
//! //   Dr Cash 1,110,000 / Cr Revenue 1,000,000 / Cr VAT payable 110,000
//! let outcome = service.create_journal(&SourceDocument::Sale(sale), &meta).await?;
//! ```

pub mod account;
pub mod adapters;
pub mod builder;
pub mod document;
pub mod error;
pub mod events;
pub mod hierarchy;
pub mod journal;
pub mod ports;
pub mod poster;
pub mod propagator;
pub mod reconciliation;
pub mod resolver;
pub mod scheduler;
pub mod service;
pub mod settings;
pub mod transition;

pub use account::{Account, AccountCategory, AccountType, CashBankAccount, NormalBalance, StandardChart};
pub use builder::JournalBuilder;
pub use document::{
    CogsDocument, DepreciationRun, DocumentItem, DocumentStatus, PaymentDirection, PaymentDocument,
    PaymentMethod, PurchaseDocument, SalesDocument, SourceDocument, TaxBreakdown, TaxComponent,
};
pub use error::{ErrorKind, LedgerError};
pub use events::{EventLog, EventSeverity, LedgerEvent};
pub use hierarchy::{HierarchyIssue, HierarchyValidator};
pub use journal::{DraftLine, JournalDraft, JournalEntry, JournalLine, JournalStatus, SourceType};
pub use ports::{
    AccountDirectory, DuplicatePosting, LedgerStore, LedgerUnitOfWork, LineTotals, ProductCost,
    ProductCostLookup, UnbalancedEntry, ENTRY_NUMBER_CONSTRAINT, POSTED_SOURCE_CONSTRAINT,
};
pub use poster::{LedgerPoster, PostMode, PostResult, RemovedJournal};
pub use propagator::{BalanceChange, BalancePropagator};
pub use reconciliation::{
    IntegrityReport, Mismatch, MismatchKind, ReconcileItem, ReconcileResult, ReconcileStatus,
    ReconcileStrategy, ReconciliationEngine,
};
pub use resolver::{AccountMapping, AccountResolver, PaymentAccountResolution};
pub use scheduler::{ReconciliationScheduler, SyncRunOutcome};
pub use service::{JournalService, PostOutcome, PostingReceipt, RemovedEntry, TransitionOutcome};
pub use settings::{LedgerSettings, ReconciliationSettings};
pub use transition::{TransitionAction, TransitionController};
