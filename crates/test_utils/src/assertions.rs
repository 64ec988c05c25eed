//! Custom Test Assertions
//!
//! Assertion helpers for ledger types that give more meaningful failure
//! messages than bare `assert!`.

use core_kernel::Money;
use domain_ledger::{Account, IntegrityReport, JournalEntry, JournalLine, MismatchKind, ReconcileResult, ReconcileStatus};
use rust_decimal::Decimal;

/// Asserts that two Money values are approximately equal within a tolerance
///
/// # Panics
///
/// Panics if the currencies don't match or the amounts differ by more than tolerance
pub fn assert_money_approx_eq(actual: &Money, expected: &Money, tolerance: Decimal) {
    assert_eq!(
        actual.currency(),
        expected.currency(),
        "Currency mismatch: actual={}, expected={}",
        actual.currency(),
        expected.currency()
    );

    let diff = (actual.amount() - expected.amount()).abs();
    assert!(
        diff <= tolerance,
        "Money amounts differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual.amount(),
        expected.amount(),
        diff,
        tolerance
    );
}

/// Asserts that a Money value is zero
pub fn assert_money_zero(money: &Money) {
    assert!(
        money.is_zero(),
        "Expected zero money, got {} {}",
        money.currency().symbol(),
        money.amount()
    );
}

/// Asserts that every line carries exactly one positive side
pub fn assert_lines_one_sided(lines: &[JournalLine]) {
    for line in lines {
        let debit = line.debit.amount();
        let credit = line.credit.amount();
        assert!(
            (debit > Decimal::ZERO) != (credit > Decimal::ZERO) && debit >= Decimal::ZERO && credit >= Decimal::ZERO,
            "Line {} on {} is not one-sided: debit={}, credit={}",
            line.line_number,
            line.account_code,
            debit,
            credit
        );
    }
}

/// Asserts that the entry header and its lines agree and balance
pub fn assert_entry_balanced(entry: &JournalEntry, lines: &[JournalLine]) {
    let debits: Decimal = lines.iter().map(|l| l.debit.amount()).sum();
    let credits: Decimal = lines.iter().map(|l| l.credit.amount()).sum();

    assert_eq!(debits, credits, "Entry {} lines do not balance", entry.entry_number);
    assert_eq!(
        entry.total_debit.amount(),
        debits,
        "Entry {} header debit differs from its lines",
        entry.entry_number
    );
    assert_eq!(
        entry.total_credit.amount(),
        credits,
        "Entry {} header credit differs from its lines",
        entry.entry_number
    );
    assert!(entry.is_balanced, "Entry {} is not flagged balanced", entry.entry_number);
}

/// Asserts that debit-normal leaf balances equal credit-normal leaf balances
pub fn assert_trial_balance(accounts: &[Account]) {
    let net: Decimal = accounts
        .iter()
        .filter(|a| !a.is_header)
        .map(|a| {
            if a.account_type.is_debit_normal() {
                a.balance.amount()
            } else {
                -a.balance.amount()
            }
        })
        .sum();
    assert_eq!(net, Decimal::ZERO, "Trial balance is off by {}", net);
}

/// Asserts that a verification pass found nothing
pub fn assert_consistent(report: &IntegrityReport) {
    assert!(
        report.consistent,
        "Expected a consistent ledger, found {} mismatches and {} hierarchy issues: {:?}",
        report.mismatches.len(),
        report.hierarchy_issues.len(),
        report.mismatches
    );
}

/// Asserts that a verification pass found exactly `count` mismatches of `kind`
pub fn assert_mismatch_count(report: &IntegrityReport, kind: MismatchKind, count: usize) {
    let found = report.mismatches_of(kind).count();
    assert_eq!(found, count, "Expected {} {:?} mismatches, found {}", count, kind, found);
}

/// Asserts that every item of a reconciliation pass is within tolerance
pub fn assert_all_matched(result: &ReconcileResult) {
    let off: Vec<_> = result
        .items
        .iter()
        .filter(|i| i.status != ReconcileStatus::Matched)
        .map(|i| (&i.account_code, i.difference))
        .collect();
    assert!(off.is_empty(), "Unreconciled items: {:?}", off);
}
