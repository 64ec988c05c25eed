//! Balance propagation
//!
//! Applies posted lines to cached account balances, rolls the change up
//! through header accounts and mirrors it onto linked cash/bank registers.
//! The leaf update is part of the posting; the roll-up and the sub-ledger
//! mirror are best effort and report failures as events.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use core_kernel::{AccountId, Currency, Money};

use crate::account::Account;
use crate::error::LedgerError;
use crate::events::{EventLog, LedgerEvent};
use crate::journal::JournalLine;
use crate::ports::LedgerUnitOfWork;

/// A cached balance before and after an update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub account_id: AccountId,
    pub account_code: String,
    pub previous: Money,
    pub current: Money,
}

/// Keeps cached balances in step with posted lines
#[derive(Debug, Clone)]
pub struct BalancePropagator {
    currency: Currency,
    max_depth: usize,
}

impl BalancePropagator {
    pub fn new(currency: Currency, max_depth: usize) -> Self {
        Self { currency, max_depth }
    }

    /// Applies newly posted lines
    #[instrument(skip_all, fields(lines = lines.len()))]
    pub async fn apply(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        lines: &[JournalLine],
        events: &mut EventLog,
    ) -> Result<Vec<BalanceChange>, LedgerError> {
        self.propagate(uow, lines, false, events).await
    }

    /// Undoes the effect of lines that are being removed
    #[instrument(skip_all, fields(lines = lines.len()))]
    pub async fn reverse(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        lines: &[JournalLine],
        events: &mut EventLog,
    ) -> Result<Vec<BalanceChange>, LedgerError> {
        self.propagate(uow, lines, true, events).await
    }

    async fn propagate(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        lines: &[JournalLine],
        reverse: bool,
        events: &mut EventLog,
    ) -> Result<Vec<BalanceChange>, LedgerError> {
        let mut order = Vec::new();
        let mut totals: HashMap<AccountId, (Money, Money)> = HashMap::new();
        for line in lines {
            let (debit, credit) = if reverse {
                (&line.credit, &line.debit)
            } else {
                (&line.debit, &line.credit)
            };
            let entry = totals.entry(line.account_id).or_insert_with(|| {
                order.push(line.account_id);
                (Money::zero(self.currency), Money::zero(self.currency))
            });
            entry.0 = entry.0.checked_add(debit)?;
            entry.1 = entry.1.checked_add(credit)?;
        }

        let mut locked = self.lock_for_update(uow, &order).await?;

        let mut changes = Vec::with_capacity(order.len());
        for account_id in order {
            let Some((debit, credit)) = totals.remove(&account_id) else {
                continue;
            };
            let account = locked
                .remove(&account_id)
                .ok_or_else(|| LedgerError::not_found("Account", account_id))?;
            check_type(&account, events);

            let delta = account.signed_change(&debit, &credit)?;
            let current = account.balance.checked_add(&delta)?;
            uow.save_account_balance(account.id, &current).await?;
            debug!(account_code = %account.code, previous = %account.balance, current = %current, "account balance updated");

            if let Some(parent_id) = account.parent_id {
                if let Err(e) = self.roll_up(uow, parent_id).await {
                    events.record(LedgerEvent::RollupFailed {
                        account_id: account.id,
                        reason: e.to_string(),
                    });
                }
            }
            self.sync_subledger(uow, &account, &current, events).await;

            changes.push(BalanceChange {
                account_id: account.id,
                account_code: account.code.clone(),
                previous: account.balance,
                current,
            });
        }
        Ok(changes)
    }

    /// Locks the posted accounts, then their ancestors
    ///
    /// Each set is taken in id order and leaves always come before headers,
    /// so two postings cannot wait on each other.
    async fn lock_for_update(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        leaf_ids: &[AccountId],
    ) -> Result<HashMap<AccountId, Account>, LedgerError> {
        let leaves = uow.lock_accounts(leaf_ids).await?;

        let mut ancestors = BTreeSet::new();
        for leaf in &leaves {
            let mut next = leaf.parent_id;
            let mut depth = 0;
            while let Some(id) = next {
                if depth >= self.max_depth || !ancestors.insert(id) {
                    break;
                }
                next = uow.account_by_id(id).await?.and_then(|a| a.parent_id);
                depth += 1;
            }
        }
        let ancestor_ids: Vec<AccountId> = ancestors
            .into_iter()
            .filter(|id| !leaf_ids.contains(id))
            .collect();
        if !ancestor_ids.is_empty() {
            uow.lock_accounts(&ancestor_ids).await?;
        }

        Ok(leaves.into_iter().map(|a| (a.id, a)).collect())
    }

    /// Recomputes each ancestor from its direct active children, walking up
    ///
    /// Bounded by the maximum hierarchy depth; a revisited account stops the
    /// walk with an error.
    pub async fn roll_up(&self, uow: &mut dyn LedgerUnitOfWork, parent_id: AccountId) -> Result<(), LedgerError> {
        let mut visited = HashSet::new();
        let mut current = Some(parent_id);
        let mut depth = 0;

        while let Some(id) = current {
            if !visited.insert(id) {
                error!(account_id = %id, "cycle detected in account hierarchy");
                return Err(LedgerError::validation(format!("cycle in account hierarchy at {}", id)));
            }
            if depth >= self.max_depth {
                return Err(LedgerError::validation(format!(
                    "account hierarchy deeper than {} levels above {}",
                    self.max_depth, parent_id
                )));
            }

            let parent = uow
                .account_by_id(id)
                .await?
                .ok_or_else(|| LedgerError::not_found("Account", id))?;
            if parent.is_header {
                let children = uow.children_of(id).await?;
                let total = Money::sum(
                    children.iter().filter(|c| c.is_active).map(|c| &c.balance),
                    self.currency,
                )?;
                if total != parent.balance {
                    uow.save_account_balance(id, &total).await?;
                    debug!(account_code = %parent.code, balance = %total, "header balance rolled up");
                }
            } else {
                debug!(account_code = %parent.code, "parent is not a header, left unchanged");
            }

            current = parent.parent_id;
            depth += 1;
        }
        Ok(())
    }

    /// Recomputes every header from its children in bounded passes
    ///
    /// Returns the headers whose balance changed.
    #[instrument(skip_all)]
    pub async fn recompute_headers(&self, uow: &mut dyn LedgerUnitOfWork) -> Result<Vec<BalanceChange>, LedgerError> {
        let accounts = uow.list_accounts().await?;
        let mut balances: HashMap<AccountId, Money> =
            accounts.iter().map(|a| (a.id, a.balance)).collect();
        let mut children: HashMap<AccountId, Vec<&Account>> = HashMap::new();
        for account in &accounts {
            if let Some(parent_id) = account.parent_id {
                children.entry(parent_id).or_default().push(account);
            }
        }
        let headers: Vec<&Account> = accounts.iter().filter(|a| a.is_header).collect();

        for pass in 0..self.max_depth {
            let mut changed = false;
            for header in &headers {
                let kids = children.get(&header.id).map(Vec::as_slice).unwrap_or(&[]);
                let sum = Money::sum(
                    kids.iter().filter(|c| c.is_active).filter_map(|c| balances.get(&c.id)),
                    self.currency,
                )?;
                if balances.get(&header.id) != Some(&sum) {
                    balances.insert(header.id, sum);
                    changed = true;
                }
            }
            if !changed {
                debug!(pass, "header balances stable");
                break;
            }
        }

        let mut changes = Vec::new();
        for header in headers {
            let Some(current) = balances.get(&header.id).copied() else {
                continue;
            };
            if current != header.balance {
                uow.save_account_balance(header.id, &current).await?;
                changes.push(BalanceChange {
                    account_id: header.id,
                    account_code: header.code.clone(),
                    previous: header.balance,
                    current,
                });
            }
        }
        Ok(changes)
    }

    async fn sync_subledger(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        account: &Account,
        balance: &Money,
        events: &mut EventLog,
    ) {
        let result = match uow.cash_bank_for_account(account.id).await {
            Ok(Some(register)) => uow.save_cash_bank_balance(register.id, balance).await,
            Ok(None) => return,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            events.record(LedgerEvent::SubledgerSyncFailed {
                account_id: account.id,
                reason: e.to_string(),
            });
        }
    }
}

fn check_type(account: &Account, events: &mut EventLog) {
    if let Some(expected) = account.type_mismatch() {
        events.record(LedgerEvent::AccountTypeMismatch {
            account_id: account.id,
            account_code: account.code.clone(),
            declared: account.account_type,
            expected,
        });
    }
}
