//! Property-Based Test Generators
//!
//! proptest strategies for source documents that satisfy the builder's
//! preconditions: positive amounts, withholdings below the invoice total and
//! whole-rupiah values.

use core_kernel::{Currency, Money};
use domain_ledger::{DocumentStatus, PaymentMethod, SalesDocument, PurchaseDocument, TaxBreakdown};
use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::builders::{PurchaseDocumentBuilder, SalesDocumentBuilder};

/// Whole-rupiah amounts between 1,000 and 100,000,000
pub fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1_000i64..100_000_000i64).prop_map(Decimal::from)
}

/// Amounts with up to two decimal places
pub fn fractional_amount_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..10_000_000_000i64).prop_map(|minor| Decimal::new(minor, 2))
}

pub fn idr_money_strategy() -> impl Strategy<Value = Money> {
    amount_strategy().prop_map(|amount| Money::new(amount, Currency::IDR))
}

/// Methods that settle immediately or on account
pub fn payment_method_strategy() -> impl Strategy<Value = PaymentMethod> {
    prop_oneof![
        Just(PaymentMethod::Cash),
        Just(PaymentMethod::Bank),
        Just(PaymentMethod::Credit),
    ]
}

/// Any document status, including unrecognized ones
pub fn status_strategy() -> impl Strategy<Value = DocumentStatus> {
    prop_oneof![
        Just(DocumentStatus::Draft),
        Just(DocumentStatus::Pending),
        Just(DocumentStatus::Confirmed),
        Just(DocumentStatus::Approved),
        Just(DocumentStatus::Invoiced),
        Just(DocumentStatus::Completed),
        Just(DocumentStatus::Paid),
        Just(DocumentStatus::Cancelled),
        "[A-Z]{3,8}".prop_map(|raw| DocumentStatus::parse(&raw)),
    ]
}

/// VAT of 0% or 11% and withholdings that stay below the subtotal
pub fn taxes_strategy(subtotal: Decimal) -> impl Strategy<Value = TaxBreakdown> {
    let cap = (subtotal / Decimal::from(10)).round_dp(0);
    (any::<bool>(), 0u32..=100, 0u32..=100).prop_map(move |(vat, w21, w23)| TaxBreakdown {
        vat: if vat { (subtotal * Decimal::new(11, 2)).round_dp(0) } else { Decimal::ZERO },
        withholding_21: (cap * Decimal::from(w21) / Decimal::from(100)).round_dp(0),
        withholding_23: (cap * Decimal::from(w23) / Decimal::from(100)).round_dp(0),
        ..Default::default()
    })
}

/// Invoiced sales with random amounts, taxes and method
pub fn sale_strategy() -> impl Strategy<Value = SalesDocument> {
    (amount_strategy(), payment_method_strategy())
        .prop_flat_map(|(subtotal, method)| {
            (Just(subtotal), Just(method), taxes_strategy(subtotal), 0i64..50_000)
        })
        .prop_map(|(subtotal, method, taxes, shipping)| {
            SalesDocumentBuilder::new()
                .with_subtotal(subtotal)
                .with_shipping(Decimal::from(shipping))
                .with_taxes(taxes)
                .with_payment_method(method)
                .build()
        })
}

/// Approved purchases with random amounts, taxes and method
pub fn purchase_strategy() -> impl Strategy<Value = PurchaseDocument> {
    (amount_strategy(), payment_method_strategy())
        .prop_flat_map(|(subtotal, method)| (Just(subtotal), Just(method), taxes_strategy(subtotal)))
        .prop_map(|(subtotal, method, taxes)| {
            PurchaseDocumentBuilder::new()
                .with_subtotal(subtotal)
                .with_taxes(taxes)
                .with_payment_method(method)
                .build()
        })
}
