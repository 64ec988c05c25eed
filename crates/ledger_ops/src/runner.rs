//! Operator commands
//!
//! Each command works against any [`LedgerStore`], so the same code drives
//! the PostgreSQL store in production and the in-memory store in tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, instrument, warn};

use core_kernel::{AccountId, Currency};
use domain_ledger::{
    IntegrityReport, LedgerStore, ReconcileResult, ReconcileStrategy, ReconciliationEngine,
    ReconciliationScheduler,
};

use crate::config::LedgerOpsConfig;
use crate::error::OpsError;

/// Options of a reconcile run
#[derive(Debug, Clone)]
pub struct ReconcileRequest {
    pub strategy: ReconcileStrategy,
    pub dry_run: bool,
    /// Account codes to limit the run to; empty means all
    pub account_codes: Vec<String>,
}

/// Runs verification and reconciliation against a ledger store
pub struct Runner {
    store: Arc<dyn LedgerStore>,
    engine: Arc<ReconciliationEngine>,
    verify_timeout: Duration,
    interval: Duration,
}

impl Runner {
    pub fn new(store: Arc<dyn LedgerStore>, config: &LedgerOpsConfig) -> Self {
        let currency: Currency = config.ledger.currency;
        let engine = Arc::new(ReconciliationEngine::new(
            Arc::clone(&store),
            config.reconciliation.clone(),
            currency,
            config.ledger.max_hierarchy_depth,
        ));
        Self {
            store,
            engine,
            verify_timeout: config.verify_timeout(),
            interval: config.reconciliation.interval(),
        }
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    /// Read-only integrity check bounded by the configured deadline
    #[instrument(skip(self))]
    pub async fn verify(&self) -> Result<IntegrityReport, OpsError> {
        let report = self.engine.verify_integrity_within(self.verify_timeout).await?;
        if report.consistent {
            info!(accounts = report.checked_accounts, "ledger is consistent");
        } else {
            warn!(
                mismatches = report.mismatches.len(),
                accounts = report.checked_accounts,
                "ledger is inconsistent"
            );
        }
        Ok(report)
    }

    /// Reconciles balances towards the requested source
    #[instrument(skip(self, request), fields(strategy = %request.strategy, dry_run = request.dry_run))]
    pub async fn reconcile(&self, request: &ReconcileRequest) -> Result<ReconcileResult, OpsError> {
        let filter = if request.account_codes.is_empty() {
            None
        } else {
            Some(self.resolve_accounts(&request.account_codes).await?)
        };

        let result = self
            .engine
            .reconcile(request.strategy, request.dry_run, filter.as_deref())
            .await?;
        info!(
            items = result.items.len(),
            applied = result.applied,
            headers = result.headers.len(),
            "reconciliation finished"
        );
        Ok(result)
    }

    /// Runs verify-then-repair passes until `shutdown` turns true
    pub async fn watch(&self, shutdown: watch::Receiver<bool>) -> Result<(), OpsError> {
        let scheduler = ReconciliationScheduler::new(Arc::clone(&self.engine));
        let handle = scheduler.spawn(self.interval, shutdown);
        handle.await?;
        Ok(())
    }

    async fn resolve_accounts(&self, codes: &[String]) -> Result<Vec<AccountId>, OpsError> {
        let mut uow = self.store.begin().await?;
        let mut ids = Vec::with_capacity(codes.len());
        let mut missing = None;
        for code in codes {
            match uow.account_by_code(code).await? {
                Some(account) => ids.push(account.id),
                None => {
                    missing = Some(code.clone());
                    break;
                }
            }
        }
        if let Err(e) = uow.rollback().await {
            warn!(error = %e, "failed to close read-only unit of work");
        }
        match missing {
            Some(code) => Err(OpsError::UnknownAccount(code)),
            None => Ok(ids),
        }
    }
}

/// One-line summary per mismatch, for terminal output
pub fn describe_report(report: &IntegrityReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .mismatches
        .iter()
        .map(|m| {
            format!(
                "{:?} {}: expected {} actual {} (difference {})",
                m.kind, m.reference, m.expected, m.actual, m.difference
            )
        })
        .collect();
    lines.extend(report.hierarchy_issues.iter().map(|issue| format!("hierarchy: {:?}", issue)));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain_ledger::{Mismatch, MismatchKind};
    use rust_decimal_macros::dec;

    #[test]
    fn test_describe_report_lists_mismatches() {
        let report = IntegrityReport {
            consistent: false,
            mismatches: vec![Mismatch {
                kind: MismatchKind::CachedBalance,
                account_id: None,
                reference: "1101".to_string(),
                expected: dec!(100),
                actual: dec!(90),
                difference: dec!(-10),
            }],
            hierarchy_issues: vec![],
            checked_accounts: 1,
            checked_at: Utc::now(),
        };

        let lines = describe_report(&report);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("CachedBalance 1101"));
    }
}
