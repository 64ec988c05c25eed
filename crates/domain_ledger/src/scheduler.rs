//! Periodic verify-then-repair
//!
//! Each pass verifies integrity and reconciles to the ledger only when the
//! check reports a problem. Passes never overlap: a pass that starts while
//! another is running is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::LedgerError;
use crate::reconciliation::{IntegrityReport, ReconcileResult, ReconcileStrategy, ReconciliationEngine};

/// Outcome of one pass
#[derive(Debug, Clone, PartialEq)]
pub enum SyncRunOutcome {
    /// Nothing to repair
    Healthy(IntegrityReport),
    /// Mismatches were found and reconciled
    Repaired {
        report: IntegrityReport,
        result: ReconcileResult,
    },
    /// Another pass was still running
    Skipped,
}

/// Runs reconciliation passes, one at a time
#[derive(Clone)]
pub struct ReconciliationScheduler {
    engine: Arc<ReconciliationEngine>,
    running: Arc<AtomicBool>,
}

struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReconciliationScheduler {
    pub fn new(engine: Arc<ReconciliationEngine>) -> Self {
        Self {
            engine,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs a single pass
    pub async fn run_once(&self) -> Result<SyncRunOutcome, LedgerError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("reconciliation pass already running, skipping");
            return Ok(SyncRunOutcome::Skipped);
        }
        let _guard = RunningGuard(Arc::clone(&self.running));

        let report = self.engine.verify_integrity().await?;
        if report.consistent {
            debug!("periodic verification clean");
            return Ok(SyncRunOutcome::Healthy(report));
        }

        info!(mismatches = report.mismatches.len(), "repairing ledger drift");
        let result = self.engine.reconcile(ReconcileStrategy::ToLedger, false, None).await?;
        Ok(SyncRunOutcome::Repaired { report, result })
    }

    /// Spawns the periodic loop; it stops when `shutdown` turns true or closes
    pub fn spawn(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = interval.as_secs(), "reconciliation scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match scheduler.run_once().await {
                            Ok(SyncRunOutcome::Repaired { result, .. }) => {
                                info!(
                                    applied = result.applied,
                                    headers = result.headers.len(),
                                    "periodic reconciliation applied corrections"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => error!(error = %e, "periodic reconciliation failed"),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("reconciliation scheduler stopped");
        })
    }
}
