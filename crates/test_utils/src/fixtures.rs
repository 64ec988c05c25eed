//! Pre-built Test Fixtures
//!
//! Ready-to-use test data for the ledger: amounts, dates, the standard chart
//! and operation metadata. Fixtures are deterministic unless the name says
//! otherwise.

use chrono::NaiveDate;
use core_kernel::{Currency, Money, OperationMetadata};
use domain_ledger::{Account, CashBankAccount, StandardChart};
use fake::faker::company::en::CompanyName;
use fake::Fake;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// A typical invoice subtotal
    pub fn idr_subtotal() -> Money {
        Money::new(dec!(1000000), Currency::IDR)
    }

    /// 11% VAT on [`Self::idr_subtotal`]
    pub fn idr_vat() -> Money {
        Money::new(dec!(110000), Currency::IDR)
    }

    pub fn idr_zero() -> Money {
        Money::zero(Currency::IDR)
    }

    /// Amount in a second currency for mismatch tests
    pub fn usd_100() -> Money {
        Money::new(dec!(100.00), Currency::USD)
    }
}

/// Fixture for posting dates
pub struct DateFixtures;

impl DateFixtures {
    /// Default document date
    pub fn posting_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    /// Month-end used for depreciation runs
    pub fn period_end() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
    }
}

/// Fixture for the standard chart of accounts
pub struct ChartFixtures;

impl ChartFixtures {
    /// Standard accounts and their two registers (petty cash, main bank)
    pub fn standard() -> (Vec<Account>, Vec<CashBankAccount>) {
        let accounts = StandardChart::create_standard_accounts(Currency::IDR);
        let registers = StandardChart::create_cash_banks(&accounts, Currency::IDR);
        (accounts, registers)
    }

    /// Finds an account by code
    ///
    /// # Panics
    ///
    /// Panics if the chart has no such code
    pub fn by_code<'a>(accounts: &'a [Account], code: &str) -> &'a Account {
        accounts
            .iter()
            .find(|a| a.code == code)
            .unwrap_or_else(|| panic!("chart has no account {}", code))
    }
}

/// Fixture for document parties and numbers
pub struct StringFixtures;

impl StringFixtures {
    pub fn invoice_number() -> &'static str {
        "INV-2025-0001"
    }

    pub fn purchase_number() -> &'static str {
        "PO-2025-0001"
    }

    pub fn payment_number() -> &'static str {
        "PAY-2025-0001"
    }

    /// Random company name for a customer or vendor
    pub fn company_name() -> String {
        CompanyName().fake()
    }
}

/// Fixture for operation metadata
pub struct MetaFixtures;

impl MetaFixtures {
    pub fn operator() -> OperationMetadata {
        OperationMetadata::initiated_by("test-operator").with_correlation_id("ledger-tests")
    }

    pub fn scheduler() -> OperationMetadata {
        OperationMetadata::initiated_by("system")
    }
}

/// Rounds an amount to whole rupiah
pub fn whole(amount: Decimal) -> Decimal {
    amount.round_dp(0)
}
