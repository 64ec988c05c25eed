//! In-memory ledger store
//!
//! Holds the whole ledger behind one async mutex. A unit of work takes the
//! lock, edits a private copy of the state and writes it back on commit, so
//! units of work are serialized and a rollback simply drops the copy. The
//! storage rules the PostgreSQL schema enforces (unique entry numbers, one
//! posted entry per source, one-sided lines, balanced posted entries) are
//! enforced here too.
//!
//! Faults can be injected to exercise failure paths.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use core_kernel::{
    AccountId, CashBankId, DomainPort, HealthCheckResult, HealthCheckable,
    JournalEntryId, Money, PortError, SourceId,
};

use crate::account::{Account, CashBankAccount};
use crate::journal::{JournalEntry, JournalLine, JournalStatus, SourceType};
use crate::ports::{
    AccountDirectory, DuplicatePosting, LedgerStore, LedgerUnitOfWork, LineTotals, UnbalancedEntry,
    ENTRY_NUMBER_CONSTRAINT, POSTED_SOURCE_CONSTRAINT,
};

/// Failures to inject into units of work
#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Line inserts fail once this many lines were inserted in one unit of work
    pub fail_line_insert_after: Option<usize>,
    /// Flipping an entry to posted fails
    pub fail_mark_posted: bool,
    /// Register balance writes fail
    pub fail_cash_bank_sync: bool,
    /// Balance writes to this account fail
    pub fail_account_save: Option<AccountId>,
    /// The next N source lookups report nothing, as if another writer raced us
    pub stale_source_lookups: usize,
    /// The next N entry inserts collide on the entry number
    pub entry_number_collisions: usize,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    cash_banks: HashMap<CashBankId, CashBankAccount>,
    cash_bank_transactions: Vec<(CashBankId, Decimal)>,
    entries: HashMap<JournalEntryId, JournalEntry>,
    lines: Vec<JournalLine>,
}

impl LedgerState {
    fn posted(&self, entry_id: &JournalEntryId) -> bool {
        self.entries.get(entry_id).is_some_and(|e| e.is_posted())
    }
}

/// In-memory implementation of [`LedgerStore`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
    faults: Arc<Mutex<Faults>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `accounts` and `cash_banks`
    pub async fn with_chart(accounts: Vec<Account>, cash_banks: Vec<CashBankAccount>) -> Self {
        let store = Self::new();
        store.seed(accounts, cash_banks).await;
        store
    }

    /// Adds accounts and registers
    pub async fn seed(&self, accounts: Vec<Account>, cash_banks: Vec<CashBankAccount>) {
        let mut state = self.state.lock().await;
        state.accounts.extend(accounts.into_iter().map(|a| (a.id, a)));
        state.cash_banks.extend(cash_banks.into_iter().map(|c| (c.id, c)));
    }

    /// Replaces the injected faults
    pub async fn inject(&self, faults: Faults) {
        *self.faults.lock().await = faults;
    }

    /// Clears every injected fault
    pub async fn clear_faults(&self) {
        *self.faults.lock().await = Faults::default();
    }

    pub async fn account(&self, code: &str) -> Option<Account> {
        self.state.lock().await.accounts.values().find(|a| a.code == code).cloned()
    }

    pub async fn accounts(&self) -> Vec<Account> {
        let mut accounts: Vec<_> = self.state.lock().await.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        accounts
    }

    pub async fn cash_bank(&self, id: CashBankId) -> Option<CashBankAccount> {
        self.state.lock().await.cash_banks.get(&id).cloned()
    }

    /// Every entry for a source, posted or draft
    pub async fn entries_for(&self, source_type: SourceType, source_id: SourceId) -> Vec<JournalEntry> {
        self.state
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.source_type == source_type && e.source_id == source_id)
            .cloned()
            .collect()
    }

    pub async fn entry_count(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn line_count(&self) -> usize {
        self.state.lock().await.lines.len()
    }

    /// Overwrites a cached balance, bypassing the ledger
    pub async fn set_account_balance(&self, code: &str, balance: Money) {
        let mut state = self.state.lock().await;
        if let Some(account) = state.accounts.values_mut().find(|a| a.code == code) {
            account.balance = balance;
        }
    }

    /// Overwrites a register balance, bypassing the ledger
    pub async fn set_cash_bank_balance(&self, id: CashBankId, balance: Money) {
        if let Some(register) = self.state.lock().await.cash_banks.get_mut(&id) {
            register.balance = balance;
        }
    }

    /// Records a register transaction
    pub async fn record_cash_bank_transaction(&self, id: CashBankId, amount: Decimal) {
        self.state.lock().await.cash_bank_transactions.push((id, amount));
    }

    /// Inserts an entry and its lines without any checks
    pub async fn insert_raw(&self, entry: JournalEntry, lines: Vec<JournalLine>) {
        let mut state = self.state.lock().await;
        state.entries.insert(entry.id, entry);
        state.lines.extend(lines);
    }
}

impl DomainPort for InMemoryLedgerStore {}

#[async_trait]
impl HealthCheckable for InMemoryLedgerStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::from_probe::<PortError>("memory-ledger-store", Instant::now(), Ok(()))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn LedgerUnitOfWork>, PortError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            faults: Arc::clone(&self.faults),
            lines_inserted: 0,
        }))
    }
}

/// A unit of work over a private copy of the state
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
    faults: Arc<Mutex<Faults>>,
    lines_inserted: usize,
}

impl MemoryUnitOfWork {
    fn totals_for(&self, account_id: AccountId) -> LineTotals {
        let (debit, credit) = self
            .working
            .lines
            .iter()
            .filter(|l| l.account_id == account_id && self.working.posted(&l.entry_id))
            .fold((Decimal::ZERO, Decimal::ZERO), |(d, c), l| {
                (d + l.debit.amount(), c + l.credit.amount())
            });
        LineTotals { account_id, debit, credit }
    }
}

#[async_trait]
impl AccountDirectory for MemoryUnitOfWork {
    async fn account_by_code(&mut self, code: &str) -> Result<Option<Account>, PortError> {
        Ok(self.working.accounts.values().find(|a| a.code == code).cloned())
    }

    async fn account_by_id(&mut self, id: AccountId) -> Result<Option<Account>, PortError> {
        Ok(self.working.accounts.get(&id).cloned())
    }

    async fn children_of(&mut self, parent_id: AccountId) -> Result<Vec<Account>, PortError> {
        let mut children: Vec<_> = self
            .working
            .accounts
            .values()
            .filter(|a| a.parent_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(children)
    }

    async fn cash_bank_by_id(&mut self, id: CashBankId) -> Result<Option<CashBankAccount>, PortError> {
        Ok(self.working.cash_banks.get(&id).cloned())
    }

    async fn cash_bank_for_account(&mut self, account_id: AccountId) -> Result<Option<CashBankAccount>, PortError> {
        Ok(self.working.cash_banks.values().find(|c| c.account_id == account_id).cloned())
    }
}

#[async_trait]
impl LedgerUnitOfWork for MemoryUnitOfWork {
    async fn find_entry_by_source(&mut self, source_type: SourceType, source_id: SourceId) -> Result<Option<JournalEntry>, PortError> {
        {
            let mut faults = self.faults.lock().await;
            if faults.stale_source_lookups > 0 {
                faults.stale_source_lookups -= 1;
                return Ok(None);
            }
        }
        let mut matches: Vec<_> = self
            .working
            .entries
            .values()
            .filter(|e| e.source_type == source_type && e.source_id == source_id)
            .collect();
        // a posted entry wins over a leftover draft
        matches.sort_by_key(|e| (!e.is_posted(), e.created_at));
        Ok(matches.first().map(|e| (*e).clone()))
    }

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), PortError> {
        {
            let mut faults = self.faults.lock().await;
            if faults.entry_number_collisions > 0 {
                faults.entry_number_collisions -= 1;
                return Err(PortError::conflict_on(ENTRY_NUMBER_CONSTRAINT, "duplicate entry number"));
            }
        }
        if self.working.entries.values().any(|e| e.entry_number == entry.entry_number) {
            return Err(PortError::conflict_on(ENTRY_NUMBER_CONSTRAINT, "duplicate entry number"));
        }
        if entry.is_posted()
            && self.working.entries.values().any(|e| {
                e.is_posted() && e.source_type == entry.source_type && e.source_id == entry.source_id
            })
        {
            return Err(PortError::conflict_on(POSTED_SOURCE_CONSTRAINT, "source already posted"));
        }
        self.working.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn insert_line(&mut self, line: &JournalLine) -> Result<(), PortError> {
        if let Some(limit) = self.faults.lock().await.fail_line_insert_after {
            if self.lines_inserted >= limit {
                return Err(PortError::internal("injected line insert failure"));
            }
        }
        if !self.working.entries.contains_key(&line.entry_id) {
            return Err(PortError::validation_field("journal entry does not exist", "entry_id"));
        }
        let one_sided = (line.debit.is_positive() && line.credit.is_zero())
            || (line.credit.is_positive() && line.debit.is_zero());
        if !one_sided {
            return Err(PortError::validation("journal line must carry exactly one positive side"));
        }
        self.working.lines.push(line.clone());
        self.lines_inserted += 1;
        Ok(())
    }

    async fn mark_posted(&mut self, entry_id: JournalEntryId, posted_at: DateTime<Utc>, posted_by: &str) -> Result<(), PortError> {
        if self.faults.lock().await.fail_mark_posted {
            return Err(PortError::internal("injected mark-posted failure"));
        }
        let entry = self
            .working
            .entries
            .get(&entry_id)
            .ok_or_else(|| PortError::not_found("JournalEntry", entry_id))?;
        if entry.total_debit != entry.total_credit {
            return Err(PortError::validation("posted entry must be balanced"));
        }
        let (source_type, source_id) = (entry.source_type, entry.source_id);
        if self.working.entries.values().any(|e| {
            e.id != entry_id && e.is_posted() && e.source_type == source_type && e.source_id == source_id
        }) {
            return Err(PortError::conflict_on(POSTED_SOURCE_CONSTRAINT, "source already posted"));
        }
        if let Some(entry) = self.working.entries.get_mut(&entry_id) {
            entry.status = JournalStatus::Posted;
            entry.posted_at = Some(posted_at);
            entry.posted_by = Some(posted_by.to_string());
        }
        Ok(())
    }

    async fn lines_for_entry(&mut self, entry_id: JournalEntryId) -> Result<Vec<JournalLine>, PortError> {
        let mut lines: Vec<_> = self.working.lines.iter().filter(|l| l.entry_id == entry_id).cloned().collect();
        lines.sort_by_key(|l| l.line_number);
        Ok(lines)
    }

    async fn delete_lines(&mut self, entry_id: JournalEntryId) -> Result<u64, PortError> {
        let before = self.working.lines.len();
        self.working.lines.retain(|l| l.entry_id != entry_id);
        Ok((before - self.working.lines.len()) as u64)
    }

    async fn delete_entry(&mut self, entry_id: JournalEntryId) -> Result<(), PortError> {
        if self.working.lines.iter().any(|l| l.entry_id == entry_id) {
            return Err(PortError::validation("journal entry still has lines"));
        }
        self.working.entries.remove(&entry_id);
        Ok(())
    }

    async fn lock_accounts(&mut self, ids: &[AccountId]) -> Result<Vec<Account>, PortError> {
        // The store lock already serializes units of work
        let mut accounts: Vec<Account> = ids
            .iter()
            .filter_map(|id| self.working.accounts.get(id).cloned())
            .collect();
        accounts.sort_by_key(|a| a.id);
        accounts.dedup_by_key(|a| a.id);
        Ok(accounts)
    }

    async fn save_account_balance(&mut self, account_id: AccountId, balance: &Money) -> Result<(), PortError> {
        if self.faults.lock().await.fail_account_save == Some(account_id) {
            return Err(PortError::internal("injected account save failure"));
        }
        let account = self
            .working
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| PortError::not_found("Account", account_id))?;
        account.balance = *balance;
        Ok(())
    }

    async fn save_cash_bank_balance(&mut self, cash_bank_id: CashBankId, balance: &Money) -> Result<(), PortError> {
        if self.faults.lock().await.fail_cash_bank_sync {
            return Err(PortError::unavailable("injected cash/bank sync failure"));
        }
        let register = self
            .working
            .cash_banks
            .get_mut(&cash_bank_id)
            .ok_or_else(|| PortError::not_found("CashBankAccount", cash_bank_id))?;
        register.balance = *balance;
        Ok(())
    }

    async fn list_accounts(&mut self) -> Result<Vec<Account>, PortError> {
        let mut accounts: Vec<_> = self.working.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn list_cash_banks(&mut self) -> Result<Vec<CashBankAccount>, PortError> {
        let mut registers: Vec<_> = self.working.cash_banks.values().cloned().collect();
        registers.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(registers)
    }

    async fn posted_line_totals(&mut self) -> Result<Vec<LineTotals>, PortError> {
        let mut account_ids: Vec<AccountId> = self.working.lines.iter().map(|l| l.account_id).collect();
        account_ids.sort();
        account_ids.dedup();
        Ok(account_ids.into_iter().map(|id| self.totals_for(id)).collect())
    }

    async fn posted_totals_for(&mut self, account_id: AccountId) -> Result<LineTotals, PortError> {
        Ok(self.totals_for(account_id))
    }

    async fn subledger_transaction_sum(&mut self, cash_bank_id: CashBankId) -> Result<Decimal, PortError> {
        Ok(self
            .working
            .cash_bank_transactions
            .iter()
            .filter(|(id, _)| *id == cash_bank_id)
            .map(|(_, amount)| *amount)
            .sum())
    }

    async fn unbalanced_posted_entries(&mut self) -> Result<Vec<UnbalancedEntry>, PortError> {
        let mut unbalanced: Vec<_> = self
            .working
            .entries
            .values()
            .filter(|e| e.is_posted())
            .filter_map(|e| {
                let (debit, credit) = self
                    .working
                    .lines
                    .iter()
                    .filter(|l| l.entry_id == e.id)
                    .fold((Decimal::ZERO, Decimal::ZERO), |(d, c), l| {
                        (d + l.debit.amount(), c + l.credit.amount())
                    });
                (debit != credit || e.total_debit != e.total_credit).then(|| UnbalancedEntry {
                    entry_id: e.id,
                    entry_number: e.entry_number.clone(),
                    total_debit: debit,
                    total_credit: credit,
                })
            })
            .collect();
        unbalanced.sort_by(|a, b| a.entry_number.cmp(&b.entry_number));
        Ok(unbalanced)
    }

    async fn duplicate_posted_sources(&mut self) -> Result<Vec<DuplicatePosting>, PortError> {
        let mut counts: HashMap<(SourceType, SourceId), i64> = HashMap::new();
        for entry in self.working.entries.values().filter(|e| e.is_posted()) {
            *counts.entry((entry.source_type, entry.source_id)).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|((source_type, source_id), entry_count)| DuplicatePosting {
                source_type,
                source_id,
                entry_count,
            })
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let MemoryUnitOfWork { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        Ok(())
    }
}
