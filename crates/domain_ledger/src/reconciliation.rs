//! Balance reconciliation
//!
//! Three balance representations can drift apart: the ledger-derived balance
//! (sum of posted lines), the cached `Account.balance`, and the mirrored
//! cash/bank register balance. [`ReconciliationEngine::verify_integrity`]
//! reports drift without writing; [`ReconciliationEngine::reconcile`] picks an
//! authoritative source and overwrites the others.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = ReconciliationEngine::new(store, ReconciliationSettings::default(), Currency::IDR, 5);
//! let report = engine.verify_integrity().await?;
//! if !report.consistent {
//!     let result = engine.reconcile(ReconcileStrategy::ToLedger, false, None).await?;
//!     println!("{} accounts corrected", result.applied);
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use core_kernel::{AccountId, CashBankId, CoreError, Currency, Money};

use crate::account::{Account, CashBankAccount};
use crate::error::LedgerError;
use crate::hierarchy::{HierarchyIssue, HierarchyValidator};
use crate::ports::{LedgerStore, LedgerUnitOfWork, LineTotals};
use crate::propagator::{BalanceChange, BalancePropagator};
use crate::settings::ReconciliationSettings;

/// Which balance is treated as the truth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStrategy {
    /// Sum of posted journal lines
    ToLedger,
    /// Sum of the register's own transactions
    ToSubledgerTransactionSum,
    /// The cached account balance
    ToCurrentCached,
}

impl ReconcileStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileStrategy::ToLedger => "to_ledger",
            ReconcileStrategy::ToSubledgerTransactionSum => "to_subledger_transaction_sum",
            ReconcileStrategy::ToCurrentCached => "to_current_cached",
        }
    }
}

impl fmt::Display for ReconcileStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconcileStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "to_ledger" | "ledger" => Ok(ReconcileStrategy::ToLedger),
            "to_subledger_transaction_sum" | "to_transactions" | "transactions" => {
                Ok(ReconcileStrategy::ToSubledgerTransactionSum)
            }
            "to_current_cached" | "to_cached" | "cached" => Ok(ReconcileStrategy::ToCurrentCached),
            other => Err(CoreError::unknown_code("reconcile strategy", other)),
        }
    }
}

/// Size of a difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconcileStatus {
    Matched,
    MinorVariance,
    Variance,
}

impl ReconcileStatus {
    /// Zero is matched, below `tolerance` is minor, anything else a variance
    pub fn classify(difference: Decimal, tolerance: Decimal) -> Self {
        let magnitude = difference.abs();
        if magnitude.is_zero() {
            ReconcileStatus::Matched
        } else if magnitude < tolerance {
            ReconcileStatus::MinorVariance
        } else {
            ReconcileStatus::Variance
        }
    }
}

/// What kind of drift a mismatch describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MismatchKind {
    /// Cached balance differs from the posted lines
    CachedBalance,
    /// Header differs from the sum of its active children
    HeaderAggregate,
    /// Register differs from its linked account
    SubledgerMirror,
    /// Posted entry with differing totals
    UnbalancedEntry,
    /// More than one posted entry for a source
    DuplicatePosting,
}

/// One finding of an integrity check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub kind: MismatchKind,
    pub account_id: Option<AccountId>,
    /// Account code, register code, entry number or source id
    pub reference: String,
    pub expected: Decimal,
    pub actual: Decimal,
    pub difference: Decimal,
}

/// Result of a read-only integrity check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// True when no balance mismatch was found
    pub consistent: bool,
    pub mismatches: Vec<Mismatch>,
    /// Structural findings; these do not affect `consistent`
    pub hierarchy_issues: Vec<HierarchyIssue>,
    pub checked_accounts: usize,
    pub checked_at: DateTime<Utc>,
}

impl IntegrityReport {
    pub fn mismatches_of(&self, kind: MismatchKind) -> impl Iterator<Item = &Mismatch> {
        self.mismatches.iter().filter(move |m| m.kind == kind)
    }
}

/// Reconciliation of one account, or one account and its register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileItem {
    pub account_id: AccountId,
    pub account_code: String,
    pub cash_bank_id: Option<CashBankId>,
    pub ledger_balance: Decimal,
    pub account_balance: Decimal,
    pub subledger_balance: Option<Decimal>,
    pub subledger_transaction_sum: Option<Decimal>,
    pub target: Decimal,
    /// Largest drift of any cached value from the target
    pub difference: Decimal,
    pub status: ReconcileStatus,
    pub applied: bool,
}

/// Result of a reconcile run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub strategy: ReconcileStrategy,
    pub dry_run: bool,
    pub items: Vec<ReconcileItem>,
    /// Number of items whose balances were overwritten
    pub applied: usize,
    /// Headers corrected by the recomputation pass
    pub headers: Vec<BalanceChange>,
}

/// Compares and repairs balance caches
pub struct ReconciliationEngine {
    store: Arc<dyn LedgerStore>,
    settings: ReconciliationSettings,
    currency: Currency,
    propagator: BalancePropagator,
    hierarchy: HierarchyValidator,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn LedgerStore>, settings: ReconciliationSettings, currency: Currency, max_depth: usize) -> Self {
        Self {
            store,
            settings,
            currency,
            propagator: BalancePropagator::new(currency, max_depth),
            hierarchy: HierarchyValidator::new(max_depth),
        }
    }

    pub fn settings(&self) -> &ReconciliationSettings {
        &self.settings
    }

    /// Read-only comparison of every balance representation
    ///
    /// # Returns
    ///
    /// An `IntegrityReport`; `consistent` is false when any balance mismatch
    /// exceeds the tolerance
    #[instrument(skip(self))]
    pub async fn verify_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let mut uow = self.store.begin().await?;
        let result = self.verify_in(uow.as_mut()).await;
        if let Err(e) = uow.rollback().await {
            warn!(error = %e, "failed to close read-only unit of work");
        }
        let report = result?;

        if report.consistent {
            info!(checked = report.checked_accounts, "ledger balances consistent");
        } else {
            warn!(
                checked = report.checked_accounts,
                mismatches = report.mismatches.len(),
                "ledger balance mismatches found"
            );
        }
        Ok(report)
    }

    /// [`ReconciliationEngine::verify_integrity`] bounded by `deadline`
    ///
    /// # Errors
    ///
    /// `LedgerError::Timeout` if the check does not finish in time
    pub async fn verify_integrity_within(&self, deadline: Duration) -> Result<IntegrityReport, LedgerError> {
        tokio::time::timeout(deadline, self.verify_integrity())
            .await
            .map_err(|_| LedgerError::Timeout {
                operation: "verify_integrity".into(),
                duration_ms: deadline.as_millis() as u64,
            })?
    }

    async fn verify_in(&self, uow: &mut dyn LedgerUnitOfWork) -> Result<IntegrityReport, LedgerError> {
        let accounts = uow.list_accounts().await?;
        let by_id: HashMap<AccountId, &Account> = accounts.iter().map(|a| (a.id, a)).collect();
        let tolerance = self.settings.tolerance;
        let mut mismatches = Vec::new();

        let totals: HashMap<AccountId, LineTotals> = uow
            .posted_line_totals()
            .await?
            .into_iter()
            .map(|t| (t.account_id, t))
            .collect();
        let mut checked_accounts = 0;
        for account in accounts.iter().filter(|a| !a.is_header) {
            // no posted lines means a ledger balance of zero
            let expected = totals
                .get(&account.id)
                .map_or(Decimal::ZERO, |t| ledger_balance(account, t));
            let actual = account.balance.amount();
            push_if_drifted(&mut mismatches, MismatchKind::CachedBalance, Some(account.id), &account.code, expected, actual, tolerance);
            checked_accounts += 1;
        }

        for header in accounts.iter().filter(|a| a.is_header) {
            let expected: Decimal = accounts
                .iter()
                .filter(|c| c.parent_id == Some(header.id) && c.is_active)
                .map(|c| c.balance.amount())
                .sum();
            push_if_drifted(&mut mismatches, MismatchKind::HeaderAggregate, Some(header.id), &header.code, expected, header.balance.amount(), tolerance);
        }

        for register in uow.list_cash_banks().await? {
            let Some(account) = by_id.get(&register.account_id) else {
                continue;
            };
            push_if_drifted(
                &mut mismatches,
                MismatchKind::SubledgerMirror,
                Some(account.id),
                &register.code,
                account.balance.amount(),
                register.balance.amount(),
                tolerance,
            );
        }

        for entry in uow.unbalanced_posted_entries().await? {
            mismatches.push(Mismatch {
                kind: MismatchKind::UnbalancedEntry,
                account_id: None,
                reference: entry.entry_number,
                expected: entry.total_debit,
                actual: entry.total_credit,
                difference: entry.total_debit - entry.total_credit,
            });
        }

        for duplicate in uow.duplicate_posted_sources().await? {
            mismatches.push(Mismatch {
                kind: MismatchKind::DuplicatePosting,
                account_id: None,
                reference: format!("{} {}", duplicate.source_type, duplicate.source_id),
                expected: Decimal::ONE,
                actual: Decimal::from(duplicate.entry_count),
                difference: Decimal::from(duplicate.entry_count - 1),
            });
        }

        Ok(IntegrityReport {
            consistent: mismatches.is_empty(),
            mismatches,
            hierarchy_issues: self.hierarchy.validate(&accounts),
            checked_accounts,
            checked_at: Utc::now(),
        })
    }

    /// Overwrites drifted balances from an authoritative source
    ///
    /// # Arguments
    ///
    /// * `strategy` - The authoritative source
    /// * `dry_run` - Report without writing
    /// * `account_ids` - Limit to these accounts (matched on the linked account for registers)
    ///
    /// Each account, or account and register pair, is corrected in its own
    /// unit of work. Headers are then recomputed from their children; a dry
    /// run reports the header changes against the current leaf balances and
    /// discards them.
    #[instrument(skip(self, account_ids))]
    pub async fn reconcile(
        &self,
        strategy: ReconcileStrategy,
        dry_run: bool,
        account_ids: Option<&[AccountId]>,
    ) -> Result<ReconcileResult, LedgerError> {
        let selected = |id: &AccountId| account_ids.map_or(true, |ids| ids.contains(id));

        let (registers, leaves) = {
            let mut uow = self.store.begin().await?;
            let snapshot = self.targets(uow.as_mut()).await;
            if let Err(e) = uow.rollback().await {
                warn!(error = %e, "failed to close read-only unit of work");
            }
            snapshot?
        };

        let mut items = Vec::new();
        for register in registers.into_iter().filter(|r| selected(&r.account_id)) {
            let mut uow = self.store.begin().await?;
            let result = self.reconcile_pair(uow.as_mut(), register.id, strategy, dry_run).await;
            items.push(self.close(uow, result, dry_run).await?);
        }

        if strategy == ReconcileStrategy::ToLedger {
            for account_id in leaves.into_iter().filter(|id| selected(id)) {
                let mut uow = self.store.begin().await?;
                let result = self.reconcile_account(uow.as_mut(), account_id, dry_run).await;
                items.push(self.close(uow, result, dry_run).await?);
            }
        }

        let applied = items.iter().filter(|i| i.applied).count();
        let headers = {
            let mut uow = self.store.begin().await?;
            match self.propagator.recompute_headers(uow.as_mut()).await {
                Ok(changes) if dry_run => {
                    uow.rollback().await?;
                    changes
                }
                Ok(changes) => {
                    uow.commit().await?;
                    changes
                }
                Err(e) => {
                    if let Err(rollback) = uow.rollback().await {
                        warn!(error = %rollback, "rollback failed");
                    }
                    return Err(e);
                }
            }
        };

        info!(items = items.len(), applied, headers = headers.len(), "reconciliation finished");
        Ok(ReconcileResult {
            strategy,
            dry_run,
            items,
            applied,
            headers,
        })
    }

    /// Registers, and every leaf account no register mirrors
    async fn targets(&self, uow: &mut dyn LedgerUnitOfWork) -> Result<(Vec<CashBankAccount>, Vec<AccountId>), LedgerError> {
        let registers = uow.list_cash_banks().await?;
        let leaves = uow
            .list_accounts()
            .await?
            .into_iter()
            .filter(|a| !a.is_header)
            .filter(|a| !registers.iter().any(|r| r.account_id == a.id))
            .map(|a| a.id)
            .collect();
        Ok((registers, leaves))
    }

    async fn reconcile_pair(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        cash_bank_id: CashBankId,
        strategy: ReconcileStrategy,
        dry_run: bool,
    ) -> Result<ReconcileItem, LedgerError> {
        let register = uow
            .cash_bank_by_id(cash_bank_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("CashBankAccount", cash_bank_id))?;
        let account = uow
            .lock_account(register.account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Account", register.account_id))?;

        let ledger = ledger_balance(&account, &uow.posted_totals_for(account.id).await?);
        let transaction_sum = uow.subledger_transaction_sum(register.id).await?;
        let cached = account.balance.amount();
        let mirrored = register.balance.amount();
        let target = match strategy {
            ReconcileStrategy::ToLedger => ledger,
            ReconcileStrategy::ToSubledgerTransactionSum => transaction_sum,
            ReconcileStrategy::ToCurrentCached => cached,
        };

        let difference = largest_drift(target, &[cached, mirrored]);
        let status = ReconcileStatus::classify(difference, self.settings.tolerance);
        let apply = !dry_run && !difference.is_zero();
        if apply {
            let balance = Money::new(target, self.currency);
            uow.save_account_balance(account.id, &balance).await?;
            uow.save_cash_bank_balance(register.id, &balance).await?;
            info!(account_code = %account.code, register = %register.code, %target, %difference, "account and register reconciled");
        } else {
            debug!(account_code = %account.code, ?status, "register checked");
        }

        Ok(ReconcileItem {
            account_id: account.id,
            account_code: account.code,
            cash_bank_id: Some(register.id),
            ledger_balance: ledger,
            account_balance: cached,
            subledger_balance: Some(mirrored),
            subledger_transaction_sum: Some(transaction_sum),
            target,
            difference,
            status,
            applied: apply,
        })
    }

    async fn reconcile_account(
        &self,
        uow: &mut dyn LedgerUnitOfWork,
        account_id: AccountId,
        dry_run: bool,
    ) -> Result<ReconcileItem, LedgerError> {
        let account = uow
            .lock_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Account", account_id))?;
        let ledger = ledger_balance(&account, &uow.posted_totals_for(account.id).await?);
        let cached = account.balance.amount();

        let difference = largest_drift(ledger, &[cached]);
        let status = ReconcileStatus::classify(difference, self.settings.tolerance);
        let apply = !dry_run && !difference.is_zero();
        if apply {
            uow.save_account_balance(account.id, &Money::new(ledger, self.currency)).await?;
            info!(account_code = %account.code, target = %ledger, %difference, "account reconciled");
        }

        Ok(ReconcileItem {
            account_id: account.id,
            account_code: account.code,
            cash_bank_id: None,
            ledger_balance: ledger,
            account_balance: cached,
            subledger_balance: None,
            subledger_transaction_sum: None,
            target: ledger,
            difference,
            status,
            applied: apply,
        })
    }

    /// Commits applied work, rolls back dry runs and failures
    async fn close(
        &self,
        uow: Box<dyn LedgerUnitOfWork>,
        result: Result<ReconcileItem, LedgerError>,
        dry_run: bool,
    ) -> Result<ReconcileItem, LedgerError> {
        match result {
            Ok(item) if item.applied => {
                uow.commit().await?;
                Ok(item)
            }
            Ok(item) => {
                uow.rollback().await?;
                debug!(dry_run, account_code = %item.account_code, "nothing written");
                Ok(item)
            }
            Err(e) => {
                if let Err(rollback) = uow.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// Posted lines expressed on the account's normal side
pub fn ledger_balance(account: &Account, totals: &LineTotals) -> Decimal {
    if account.account_type.is_debit_normal() {
        totals.net()
    } else {
        -totals.net()
    }
}

/// Signed difference of the value furthest from `target`
fn largest_drift(target: Decimal, values: &[Decimal]) -> Decimal {
    values
        .iter()
        .map(|v| *v - target)
        .max_by_key(|d| d.abs())
        .unwrap_or(Decimal::ZERO)
}

fn push_if_drifted(
    mismatches: &mut Vec<Mismatch>,
    kind: MismatchKind,
    account_id: Option<AccountId>,
    reference: &str,
    expected: Decimal,
    actual: Decimal,
    tolerance: Decimal,
) {
    let difference = actual - expected;
    if difference.abs() > tolerance {
        mismatches.push(Mismatch {
            kind,
            account_id,
            reference: reference.to_string(),
            expected,
            actual,
            difference,
        });
    }
}
