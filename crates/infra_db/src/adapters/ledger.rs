//! PostgreSQL Ledger Adapter
//!
//! Implements [`LedgerStore`] on a connection pool. Each unit of work owns one
//! database transaction.
//!
//! PostgreSQL aborts a transaction on the first failed statement, while the
//! poster expects to retry an entry-number collision, compensate a failed
//! flip and continue after a failed roll-up. Every mutating statement
//! therefore runs under a savepoint that is released on success and rolled
//! back to on failure, leaving the transaction usable.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresLedgerStore;
//! use domain_ledger::LedgerStore;
//!
//! let store = PostgresLedgerStore::new(pool, Currency::IDR);
//! let mut uow = store.begin().await?;
//! let cash = uow.account_by_code("1101").await?;
//! uow.commit().await?;
//! ```

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, instrument};

use core_kernel::{
    AccountId, CashBankId, Currency, DomainPort, HealthCheckResult, HealthCheckable,
    JournalEntryId, Money, PortError, SourceId,
};
use domain_ledger::{
    Account, AccountDirectory, CashBankAccount, DuplicatePosting, JournalEntry, JournalLine,
    LedgerStore, LedgerUnitOfWork, LineTotals, SourceType, UnbalancedEntry,
};

use crate::error::DatabaseError;
use crate::repositories::ledger as sql;

const SAVEPOINT: &str = "SAVEPOINT ledger_write";
const RELEASE: &str = "RELEASE SAVEPOINT ledger_write";
const ROLLBACK_TO: &str = "ROLLBACK TO SAVEPOINT ledger_write";

/// PostgreSQL-backed ledger store
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    currency: Currency,
}

impl PostgresLedgerStore {
    /// Creates a store; balances are read and written in `currency`
    pub fn new(pool: PgPool, currency: Currency) -> Self {
        Self { pool, currency }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts a chart of accounts and its registers in one transaction
    ///
    /// Accounts must be ordered parents first, as
    /// [`domain_ledger::StandardChart`] produces them.
    #[instrument(skip_all, fields(accounts = accounts.len(), registers = cash_banks.len()))]
    pub async fn seed_chart(&self, accounts: &[Account], cash_banks: &[CashBankAccount]) -> Result<(), DatabaseError> {
        let mut tx = self.pool.begin().await?;
        for account in accounts {
            sql::insert_account(&mut tx, account).await?;
        }
        for register in cash_banks {
            sql::insert_cash_bank(&mut tx, register).await?;
        }
        tx.commit().await?;
        info!("chart of accounts seeded");
        Ok(())
    }

    /// Records a register movement outside the journal
    pub async fn record_cash_bank_transaction(
        &self,
        cash_bank_id: CashBankId,
        transaction_date: NaiveDate,
        amount: Decimal,
        description: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        sql::insert_cash_bank_transaction(&mut conn, cash_bank_id, transaction_date, amount, description).await?;
        Ok(())
    }
}

impl DomainPort for PostgresLedgerStore {}

#[async_trait]
impl HealthCheckable for PostgresLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let probe = sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ());
        HealthCheckResult::from_probe("postgres-ledger-store", started, probe)
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnitOfWork>, PortError> {
        let tx = self.pool.begin().await.map_err(DatabaseError::from)?;
        debug!("ledger transaction opened");
        Ok(Box::new(PostgresUnitOfWork {
            tx,
            currency: self.currency,
        }))
    }
}

/// A unit of work bound to one PostgreSQL transaction
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
    currency: Currency,
}

impl PostgresUnitOfWork {
    async fn savepoint(&mut self) -> Result<(), PortError> {
        sqlx::query(SAVEPOINT)
            .execute(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    /// Releases the savepoint on success, rolls back to it on failure
    async fn settle<T>(&mut self, result: Result<T, DatabaseError>) -> Result<T, PortError> {
        let statement = if result.is_ok() { RELEASE } else { ROLLBACK_TO };
        sqlx::query(statement)
            .execute(&mut *self.tx)
            .await
            .map_err(DatabaseError::from)?;
        result.map_err(PortError::from)
    }

    fn account(&self, row: Option<sql::AccountRow>) -> Result<Option<Account>, PortError> {
        Ok(row.map(|r| r.into_domain(self.currency)).transpose()?)
    }
}

#[async_trait]
impl AccountDirectory for PostgresUnitOfWork {
    async fn account_by_code(&mut self, code: &str) -> Result<Option<Account>, PortError> {
        let row = sql::account_by_code(&mut self.tx, code).await?;
        self.account(row)
    }

    async fn account_by_id(&mut self, id: AccountId) -> Result<Option<Account>, PortError> {
        let row = sql::account_by_id(&mut self.tx, id).await?;
        self.account(row)
    }

    async fn children_of(&mut self, parent_id: AccountId) -> Result<Vec<Account>, PortError> {
        let rows = sql::children_of(&mut self.tx, parent_id).await?;
        Ok(rows
            .into_iter()
            .map(|r| r.into_domain(self.currency))
            .collect::<Result<_, _>>()?)
    }

    async fn cash_bank_by_id(&mut self, id: CashBankId) -> Result<Option<CashBankAccount>, PortError> {
        let row = sql::cash_bank_by_id(&mut self.tx, id).await?;
        Ok(row.map(|r| r.into_domain(self.currency)))
    }

    async fn cash_bank_for_account(&mut self, account_id: AccountId) -> Result<Option<CashBankAccount>, PortError> {
        let row = sql::cash_bank_for_account(&mut self.tx, account_id).await?;
        Ok(row.map(|r| r.into_domain(self.currency)))
    }
}

#[async_trait]
impl LedgerUnitOfWork for PostgresUnitOfWork {
    async fn find_entry_by_source(&mut self, source_type: SourceType, source_id: SourceId) -> Result<Option<JournalEntry>, PortError> {
        let row = sql::entry_by_source(&mut self.tx, source_type, source_id).await?;
        Ok(row.map(|r| r.into_domain(self.currency)).transpose()?)
    }

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        self.savepoint().await?;
        let result = sql::insert_entry(&mut self.tx, entry).await;
        self.settle(result).await
    }

    async fn insert_line(&mut self, line: &JournalLine) -> Result<(), PortError> {
        self.savepoint().await?;
        let result = sql::insert_line(&mut self.tx, line).await;
        self.settle(result).await
    }

    async fn mark_posted(&mut self, entry_id: JournalEntryId, posted_at: DateTime<Utc>, posted_by: &str) -> Result<(), PortError> {
        self.savepoint().await?;
        let result = sql::mark_posted(&mut self.tx, entry_id, posted_at, posted_by).await;
        self.settle(result).await
    }

    async fn lines_for_entry(&mut self, entry_id: JournalEntryId) -> Result<Vec<JournalLine>, PortError> {
        let rows = sql::lines_for_entry(&mut self.tx, entry_id).await?;
        Ok(rows.into_iter().map(|r| r.into_domain(self.currency)).collect())
    }

    async fn delete_lines(&mut self, entry_id: JournalEntryId) -> Result<u64, PortError> {
        self.savepoint().await?;
        let result = sql::delete_lines(&mut self.tx, entry_id).await;
        self.settle(result).await
    }

    async fn delete_entry(&mut self, entry_id: JournalEntryId) -> Result<(), PortError> {
        self.savepoint().await?;
        let result = sql::delete_entry(&mut self.tx, entry_id).await;
        self.settle(result).await
    }

    async fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<Vec<Account>, PortError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sql::lock_accounts(&mut self.tx, ids).await?;
        Ok(rows
            .into_iter()
            .map(|r| r.into_domain(self.currency))
            .collect::<Result<_, _>>()?)
    }

    async fn save_account_balance(&mut self, account_id: AccountId, balance: &Money) -> Result<(), PortError> {
        self.savepoint().await?;
        let result = sql::update_account_balance(&mut self.tx, account_id, balance.amount()).await;
        self.settle(result).await
    }

    async fn save_cash_bank_balance(&mut self, cash_bank_id: CashBankId, balance: &Money) -> Result<(), PortError> {
        self.savepoint().await?;
        let result = sql::update_cash_bank_balance(&mut self.tx, cash_bank_id, balance.amount()).await;
        self.settle(result).await
    }

    async fn list_accounts(&mut self) -> Result<Vec<Account>, PortError> {
        let rows = sql::list_accounts(&mut self.tx).await?;
        Ok(rows
            .into_iter()
            .map(|r| r.into_domain(self.currency))
            .collect::<Result<_, _>>()?)
    }

    async fn list_cash_banks(&mut self) -> Result<Vec<CashBankAccount>, PortError> {
        let rows = sql::list_cash_banks(&mut self.tx).await?;
        Ok(rows.into_iter().map(|r| r.into_domain(self.currency)).collect())
    }

    async fn posted_line_totals(&mut self) -> Result<Vec<LineTotals>, PortError> {
        let rows = sql::posted_line_totals(&mut self.tx).await?;
        Ok(rows.into_iter().map(LineTotals::from).collect())
    }

    async fn posted_totals_for(&mut self, account_id: AccountId) -> Result<LineTotals, PortError> {
        Ok(sql::posted_totals_for(&mut self.tx, account_id).await?.into())
    }

    async fn subledger_transaction_sum(&mut self, cash_bank_id: CashBankId) -> Result<Decimal, PortError> {
        Ok(sql::subledger_transaction_sum(&mut self.tx, cash_bank_id).await?)
    }

    async fn unbalanced_posted_entries(&mut self) -> Result<Vec<UnbalancedEntry>, PortError> {
        let rows = sql::unbalanced_posted_entries(&mut self.tx).await?;
        Ok(rows.into_iter().map(UnbalancedEntry::from).collect())
    }

    async fn duplicate_posted_sources(&mut self) -> Result<Vec<DuplicatePosting>, PortError> {
        let rows = sql::duplicate_posted_sources(&mut self.tx).await?;
        Ok(rows
            .into_iter()
            .map(sql::DuplicatePostingRow::into_domain)
            .collect::<Result<_, _>>()?)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        self.tx.commit().await.map_err(DatabaseError::from)?;
        debug!("ledger transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        self.tx.rollback().await.map_err(DatabaseError::from)?;
        debug!("ledger transaction rolled back");
        Ok(())
    }
}
