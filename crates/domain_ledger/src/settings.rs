//! Tunable ledger behaviour
//!
//! Plain serde structs with defaults, so any configuration source (the
//! operator binary's environment loader, a test, an embedding service) can
//! fill them.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use core_kernel::Currency;

use crate::resolver::AccountMapping;

/// Posting behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Ledger currency; all lines and balances use it
    pub currency: Currency,
    /// Tax components below this amount are not posted
    pub materiality_threshold: Decimal,
    /// Largest imbalance absorbed into the primary debit line; zero disables
    pub balancing_tolerance: Decimal,
    /// Whether sales carry their COGS pair in the same entry
    pub inline_cogs: bool,
    /// Deepest allowed account hierarchy
    pub max_hierarchy_depth: usize,
    /// Account codes used by the builder
    pub accounts: AccountMapping,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            currency: Currency::IDR,
            materiality_threshold: Decimal::ONE,
            balancing_tolerance: Decimal::ZERO,
            inline_cogs: true,
            max_hierarchy_depth: 5,
            accounts: AccountMapping::default(),
        }
    }
}

impl LedgerSettings {
    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub fn with_balancing_tolerance(mut self, tolerance: Decimal) -> Self {
        self.balancing_tolerance = tolerance;
        self
    }

    pub fn with_materiality_threshold(mut self, threshold: Decimal) -> Self {
        self.materiality_threshold = threshold;
        self
    }

    pub fn with_inline_cogs(mut self, inline_cogs: bool) -> Self {
        self.inline_cogs = inline_cogs;
        self
    }

    pub fn with_accounts(mut self, accounts: AccountMapping) -> Self {
        self.accounts = accounts;
        self
    }
}

/// Reconciliation behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationSettings {
    /// Differences above this are reported as mismatches
    pub tolerance: Decimal,
    /// Seconds between periodic verify-then-repair passes
    pub interval_secs: u64,
}

impl Default for ReconciliationSettings {
    fn default() -> Self {
        Self {
            tolerance: dec!(0.01),
            interval_secs: 3600,
        }
    }
}

impl ReconciliationSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = LedgerSettings::default();
        assert_eq!(settings.balancing_tolerance, Decimal::ZERO);
        assert_eq!(settings.materiality_threshold, Decimal::ONE);
        assert!(settings.inline_cogs);
        assert_eq!(settings.accounts.cash, "1101");

        let recon = ReconciliationSettings::default();
        assert_eq!(recon.tolerance, dec!(0.01));
        assert_eq!(recon.interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings: LedgerSettings =
            serde_json::from_str(r#"{"inline_cogs": false, "accounts": {"revenue": "4100"}}"#).unwrap();
        assert!(!settings.inline_cogs);
        assert_eq!(settings.accounts.revenue, "4100");
        assert_eq!(settings.accounts.vat_output, "2103");
        assert_eq!(settings.max_hierarchy_depth, 5);
    }
}
