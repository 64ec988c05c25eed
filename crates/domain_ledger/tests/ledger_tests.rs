//! Tests for domain_ledger against the in-memory store

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{AccountId, CashBankId, Currency, Money, OperationMetadata, SourceId};

use domain_ledger::adapters::{Faults, InMemoryLedgerStore, InMemoryProductCatalog};
use domain_ledger::{
    Account, AccountMapping, AccountType, DepreciationRun, DocumentItem, DocumentStatus, DraftLine,
    JournalDraft, JournalEntry, JournalLine, JournalService, JournalStatus, LedgerError, LedgerEvent,
    LedgerSettings, LedgerStore,
    MismatchKind, PaymentDirection, PaymentDocument, PaymentMethod, PostOutcome, PurchaseDocument,
    ReconcileStatus, ReconcileStrategy, ReconciliationEngine, ReconciliationScheduler,
    ReconciliationSettings, SalesDocument, SourceDocument, SourceType, StandardChart,
    SyncRunOutcome, TaxBreakdown, TransitionAction,
};

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    store: InMemoryLedgerStore,
    catalog: InMemoryProductCatalog,
    service: JournalService,
    engine: Arc<ReconciliationEngine>,
    cash_register: CashBankId,
    bank_register: CashBankId,
}

impl Harness {
    async fn new() -> Self {
        Self::with_settings(LedgerSettings::default()).await
    }

    async fn with_settings(settings: LedgerSettings) -> Self {
        let accounts = StandardChart::create_standard_accounts(Currency::IDR);
        let registers = StandardChart::create_cash_banks(&accounts, Currency::IDR);
        let cash_register = registers[0].id;
        let bank_register = registers[1].id;
        let store = InMemoryLedgerStore::with_chart(accounts, registers).await;
        let catalog = InMemoryProductCatalog::new();
        let service = JournalService::new(Arc::new(store.clone()), Arc::new(catalog.clone()), settings);
        let engine = Arc::new(ReconciliationEngine::new(
            Arc::new(store.clone()),
            ReconciliationSettings::default(),
            Currency::IDR,
            5,
        ));
        Self {
            store,
            catalog,
            service,
            engine,
            cash_register,
            bank_register,
        }
    }

    async fn balance(&self, code: &str) -> Decimal {
        self.store.account(code).await.expect("account exists").balance.amount()
    }

    async fn register_balance(&self, id: CashBankId) -> Decimal {
        self.store.cash_bank(id).await.expect("register exists").balance.amount()
    }

    /// Sum of debit-normal leaf balances minus credit-normal leaf balances
    async fn trial_balance(&self) -> Decimal {
        self.store
            .accounts()
            .await
            .iter()
            .filter(|a| !a.is_header)
            .map(|a| {
                if a.account_type.is_debit_normal() {
                    a.balance.amount()
                } else {
                    -a.balance.amount()
                }
            })
            .sum()
    }
}

fn meta() -> OperationMetadata {
    OperationMetadata::initiated_by("tester")
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
}

fn sale(subtotal: Decimal, vat: Decimal, method: &str) -> SalesDocument {
    SalesDocument {
        id: SourceId::new(),
        number: "INV-2025-0001".into(),
        date: date(),
        status: DocumentStatus::Invoiced,
        customer_name: "PT Maju Jaya".into(),
        subtotal,
        shipping: Decimal::ZERO,
        taxes: TaxBreakdown::vat(vat),
        total_amount: subtotal + vat,
        payment_method: PaymentMethod::parse(method),
        cash_bank_id: None,
        items: vec![DocumentItem::new(None, "Consulting services", dec!(1), subtotal)],
    }
}

fn purchase(subtotal: Decimal, taxes: TaxBreakdown, method: &str) -> PurchaseDocument {
    let total = subtotal + taxes.vat - taxes.withholding_23;
    PurchaseDocument {
        id: SourceId::new(),
        number: "PO-2025-0001".into(),
        date: date(),
        status: DocumentStatus::Approved,
        vendor_name: "CV Sumber Rejeki".into(),
        subtotal,
        shipping: Decimal::ZERO,
        taxes,
        total_amount: total,
        payment_method: PaymentMethod::parse(method),
        cash_bank_id: None,
        items: vec![DocumentItem::new(None, "Office chairs", dec!(4), subtotal / dec!(4))],
    }
}

fn payment(direction: PaymentDirection, amount: Decimal, method: &str, register: Option<CashBankId>) -> PaymentDocument {
    PaymentDocument {
        id: SourceId::new(),
        number: "PAY-2025-0001".into(),
        date: date(),
        status: DocumentStatus::Completed,
        direction,
        amount,
        payment_method: PaymentMethod::parse(method),
        cash_bank_id: register,
        settles: Some("INV-2025-0001".into()),
    }
}

fn posted(outcome: &PostOutcome) -> (&JournalEntry, &[JournalLine], &[LedgerEvent]) {
    let receipt = outcome.receipt().expect("entry posted");
    (&receipt.entry, &receipt.lines, &receipt.events)
}

fn line_amounts(lines: &[JournalLine]) -> Vec<(String, Decimal, Decimal)> {
    lines
        .iter()
        .map(|l| (l.account_code.clone(), l.debit.amount(), l.credit.amount()))
        .collect()
}

// ============================================================================
// Builder Tests
// ============================================================================

mod builder_tests {
    use super::*;

    #[tokio::test]
    async fn test_cash_sale_with_vat() {
        let h = Harness::new().await;
        let doc = SourceDocument::Sale(sale(dec!(1000000), dec!(110000), "CASH"));

        let outcome = h.service.create_journal(&doc, &meta()).await.unwrap();
        let (entry, lines, _) = posted(&outcome);

        assert_eq!(
            line_amounts(lines),
            vec![
                ("1101".to_string(), dec!(1110000), dec!(0)),
                ("4101".to_string(), dec!(0), dec!(1000000)),
                ("2103".to_string(), dec!(0), dec!(110000)),
            ]
        );
        assert!(entry.is_posted());
        assert!(entry.is_balanced);
        assert_eq!(entry.total_debit.amount(), dec!(1110000));
        assert_eq!(entry.posted_by.as_deref(), Some("tester"));
        assert!(entry.entry_number.starts_with("SALE-"));
    }

    #[tokio::test]
    async fn test_unknown_method_falls_back_to_receivable_with_event() {
        let h = Harness::new().await;
        let doc = SourceDocument::Sale(sale(dec!(500000), dec!(0), ""));

        let outcome = h.service.create_journal(&doc, &meta()).await.unwrap();
        let (_, lines, events) = posted(&outcome);

        assert_eq!(lines[0].account_code, "1201");
        assert!(events
            .iter()
            .any(|e| matches!(e, LedgerEvent::UnknownPaymentMethod { fallback_code, .. } if fallback_code == "1201")));
    }

    #[tokio::test]
    async fn test_bank_sale_settles_through_register() {
        let h = Harness::new().await;
        let mut doc = sale(dec!(200000), dec!(22000), "BANK_TRANSFER");
        doc.cash_bank_id = Some(h.bank_register);

        let outcome = h.service.create_journal(&SourceDocument::Sale(doc), &meta()).await.unwrap();
        let (_, lines, _) = posted(&outcome);

        assert_eq!(lines[0].account_code, "1102");
        assert_eq!(h.register_balance(h.bank_register).await, dec!(222000));
    }

    #[tokio::test]
    async fn test_customer_withholding_is_prepaid_tax() {
        let h = Harness::new().await;
        let mut doc = sale(dec!(1000000), dec!(110000), "KREDIT");
        doc.taxes.withholding_23 = dec!(20000);
        doc.total_amount = dec!(1090000);

        let outcome = h.service.create_journal(&SourceDocument::Sale(doc), &meta()).await.unwrap();
        let (_, lines, events) = posted(&outcome);

        assert_eq!(
            line_amounts(lines),
            vec![
                ("1201".to_string(), dec!(1090000), dec!(0)),
                ("1115".to_string(), dec!(20000), dec!(0)),
                ("4101".to_string(), dec!(0), dec!(1000000)),
                ("2103".to_string(), dec!(0), dec!(110000)),
            ]
        );
        assert!(!events.iter().any(|e| matches!(e, LedgerEvent::TotalMismatch { .. })));
    }

    #[tokio::test]
    async fn test_shipping_and_other_tax_lines() {
        let h = Harness::new().await;
        let mut doc = sale(dec!(1000000), dec!(110000), "CASH");
        doc.shipping = dec!(50000);
        doc.taxes.other_tax_additions = dec!(5000);
        doc.total_amount = dec!(1165000);

        let outcome = h.service.create_journal(&SourceDocument::Sale(doc), &meta()).await.unwrap();
        let (entry, lines, _) = posted(&outcome);

        let codes: Vec<_> = lines.iter().map(|l| l.account_code.as_str()).collect();
        assert_eq!(codes, vec!["1101", "4101", "4102", "2103", "2108"]);
        assert_eq!(entry.total_credit.amount(), dec!(1165000));
    }

    #[tokio::test]
    async fn test_immaterial_tax_excluded_from_both_sides() {
        let h = Harness::new().await;
        let mut doc = sale(dec!(1000), dec!(0.5), "CASH");
        doc.total_amount = dec!(1000);

        let outcome = h.service.create_journal(&SourceDocument::Sale(doc), &meta()).await.unwrap();
        let (entry, lines, _) = posted(&outcome);

        assert_eq!(lines.len(), 2);
        assert_eq!(entry.total_debit.amount(), dec!(1000));
    }

    #[tokio::test]
    async fn test_total_mismatch_is_reported() {
        let h = Harness::new().await;
        let mut doc = sale(dec!(1000), dec!(110), "CASH");
        doc.total_amount = dec!(1200);

        let outcome = h.service.create_journal(&SourceDocument::Sale(doc), &meta()).await.unwrap();
        let (_, _, events) = posted(&outcome);

        assert!(events.iter().any(|e| matches!(
            e,
            LedgerEvent::TotalMismatch { computed, declared } if *computed == dec!(1110) && *declared == dec!(1200)
        )));
    }

    #[tokio::test]
    async fn test_inline_cogs_pair() {
        let h = Harness::new().await;
        let widget = h.catalog.add("Widget", dec!(60000)).await;
        let free = h.catalog.add("Free sample", dec!(0)).await;
        let mut doc = sale(dec!(1000000), dec!(0), "CASH");
        doc.items = vec![
            DocumentItem::new(Some(widget), "Widget", dec!(10), dec!(100000)),
            DocumentItem::new(Some(free), "Free sample", dec!(1), dec!(0)),
        ];

        let outcome = h.service.create_journal(&SourceDocument::Sale(doc), &meta()).await.unwrap();
        let (_, lines, events) = posted(&outcome);

        assert!(line_amounts(lines).contains(&("5101".to_string(), dec!(600000), dec!(0))));
        assert!(line_amounts(lines).contains(&("1301".to_string(), dec!(0), dec!(600000))));
        assert!(events.iter().any(|e| matches!(e, LedgerEvent::CogsItemSkipped { product_id: Some(id), .. } if *id == free)));
        assert_eq!(h.balance("5101").await, dec!(600000));
        assert_eq!(h.balance("1301").await, dec!(-600000));
    }

    #[tokio::test]
    async fn test_cogs_overflow_rejected() {
        let h = Harness::new().await;
        let priceless = h.catalog.add("Priceless", Decimal::MAX).await;
        let mut doc = sale(dec!(1000000), dec!(0), "CASH");
        doc.items = vec![DocumentItem::new(Some(priceless), "Priceless", dec!(2), dec!(500000))];

        let err = h.service.create_journal(&SourceDocument::Sale(doc), &meta()).await.unwrap_err();

        assert!(matches!(err, LedgerError::Validation { .. }));
        assert_eq!(h.store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_inline_cogs_disabled() {
        let h = Harness::with_settings(LedgerSettings::default().with_inline_cogs(false)).await;
        let widget = h.catalog.add("Widget", dec!(60000)).await;
        let mut doc = sale(dec!(1000000), dec!(0), "CASH");
        doc.items = vec![DocumentItem::new(Some(widget), "Widget", dec!(10), dec!(100000))];

        let outcome = h.service.create_journal(&SourceDocument::Sale(doc), &meta()).await.unwrap();
        let (_, lines, _) = posted(&outcome);

        assert_eq!(lines.len(), 2);
        assert_eq!(h.balance("5101").await, dec!(0));
    }

    #[tokio::test]
    async fn test_purchase_on_credit_with_withholding() {
        let h = Harness::new().await;
        let taxes = TaxBreakdown {
            vat: dec!(220000),
            withholding_23: dec!(40000),
            ..Default::default()
        };
        let doc = SourceDocument::Purchase(purchase(dec!(2000000), taxes, "HUTANG"));

        let outcome = h.service.create_journal(&doc, &meta()).await.unwrap();
        let (_, lines, events) = posted(&outcome);

        assert_eq!(
            line_amounts(lines),
            vec![
                ("1301".to_string(), dec!(2000000), dec!(0)),
                ("1240".to_string(), dec!(220000), dec!(0)),
                ("2101".to_string(), dec!(0), dec!(2180000)),
                ("2112".to_string(), dec!(0), dec!(40000)),
            ]
        );
        assert!(events.is_empty());
        assert_eq!(h.balance("2101").await, dec!(2180000));
    }

    #[tokio::test]
    async fn test_purchase_item_expense_account() {
        let h = Harness::new().await;
        let opex = h.store.account("6001").await.unwrap();
        let mut doc = purchase(dec!(300000), TaxBreakdown::default(), "CASH");
        doc.items = vec![DocumentItem::new(None, "Cleaning", dec!(1), dec!(300000)).with_expense_account(opex.id)];

        let outcome = h.service.create_journal(&SourceDocument::Purchase(doc), &meta()).await.unwrap();
        let (_, lines, _) = posted(&outcome);

        assert_eq!(
            line_amounts(lines),
            vec![
                ("6001".to_string(), dec!(300000), dec!(0)),
                ("1101".to_string(), dec!(0), dec!(300000)),
            ]
        );
    }

    #[tokio::test]
    async fn test_payments() {
        let h = Harness::new().await;
        let received = payment(PaymentDirection::Received, dec!(750000), "TRANSFER", Some(h.bank_register));
        let made = payment(PaymentDirection::Made, dec!(250000), "CASH", None);

        let outcome = h.service.create_journal(&received.into(), &meta()).await.unwrap();
        let (entry, lines, _) = posted(&outcome);
        assert_eq!(entry.source_type, SourceType::SalesPayment);
        assert_eq!(lines[0].account_code, "1102");
        assert_eq!(lines[1].account_code, "1201");

        let outcome = h.service.create_journal(&made.into(), &meta()).await.unwrap();
        let (entry, lines, _) = posted(&outcome);
        assert_eq!(entry.source_type, SourceType::PurchasePayment);
        assert_eq!(lines[0].account_code, "2101");
        assert_eq!(lines[1].account_code, "1101");

        assert_eq!(h.register_balance(h.bank_register).await, dec!(750000));
        assert_eq!(h.register_balance(h.cash_register).await, dec!(-250000));
    }

    #[tokio::test]
    async fn test_credit_payment_without_register_is_rejected() {
        let h = Harness::new().await;
        let doc = payment(PaymentDirection::Made, dec!(1000), "KREDIT", None);

        let err = h.service.create_journal(&doc.into(), &meta()).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_depreciation_run() {
        let h = Harness::new().await;
        let run = DepreciationRun {
            id: SourceId::new(),
            asset_name: "Delivery van".into(),
            period: date(),
            status: DocumentStatus::Completed,
            amount: dec!(500000),
            expense_account_id: None,
            accumulated_account_id: None,
        };

        h.service.create_journal(&run.into(), &meta()).await.unwrap();

        assert_eq!(h.balance("6201").await, dec!(500000));
        assert_eq!(h.balance("1502").await, dec!(-500000));
        assert_eq!(h.balance("1500").await, dec!(-500000));
    }

    #[tokio::test]
    async fn test_missing_tax_account_leaves_entry_unbalanced() {
        let mapping = AccountMapping {
            vat_output: "2999".into(),
            ..Default::default()
        };
        let h = Harness::with_settings(LedgerSettings::default().with_accounts(mapping)).await;
        let doc = SourceDocument::Sale(sale(dec!(1000000), dec!(110000), "CASH"));

        let err = h.service.create_journal(&doc, &meta()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unbalanced { difference, .. } if difference == dec!(110000)));
        assert_eq!(h.store.entry_count().await, 0);
        assert_eq!(h.balance("1101").await, dec!(0));
    }

    #[tokio::test]
    async fn test_inactive_tax_account_falls_back() {
        let h = Harness::new().await;
        let other_taxes = h.store.account("2108").await.unwrap();
        h.store.seed(vec![other_taxes.deactivated()], vec![]).await;
        let mut doc = sale(dec!(1000000), dec!(0), "CASH");
        doc.taxes.other_tax_additions = dec!(10000);
        doc.total_amount = dec!(1010000);

        let outcome = h.service.create_journal(&SourceDocument::Sale(doc), &meta()).await.unwrap();
        let (entry, _, _) = posted(&outcome);

        assert!(entry.is_balanced);
        assert_eq!(h.balance("2103").await, dec!(10000));
        assert_eq!(h.balance("2108").await, dec!(0));
        assert_eq!(h.balance("1101").await, dec!(1010000));
    }

    #[tokio::test]
    async fn test_small_imbalance_adjusted_when_tolerance_enabled() {
        let mapping = AccountMapping {
            vat_output: "2999".into(),
            ..Default::default()
        };
        let settings = LedgerSettings::default()
            .with_accounts(mapping)
            .with_materiality_threshold(dec!(0.01))
            .with_balancing_tolerance(dec!(1));
        let h = Harness::with_settings(settings).await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0.5), "CASH"));

        let outcome = h.service.create_journal(&doc, &meta()).await.unwrap();
        let (entry, lines, events) = posted(&outcome);

        assert_eq!(lines[0].debit.amount(), dec!(1000));
        assert_eq!(entry.total_debit, entry.total_credit);
        assert!(events.iter().any(|e| matches!(e, LedgerEvent::TaxLineSkipped { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            LedgerEvent::AutoBalanceAdjusted { account_code, difference } if account_code == "1101" && *difference == dec!(-0.5)
        )));
    }

    #[tokio::test]
    async fn test_header_account_rejected() {
        let mapping = AccountMapping {
            revenue: "4000".into(),
            ..Default::default()
        };
        let h = Harness::with_settings(LedgerSettings::default().with_accounts(mapping)).await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0), "CASH"));

        let err = h.service.create_journal(&doc, &meta()).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_missing_mandatory_account() {
        let mapping = AccountMapping {
            revenue: "4999".into(),
            ..Default::default()
        };
        let h = Harness::with_settings(LedgerSettings::default().with_accounts(mapping)).await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0), "CASH"));

        let err = h.service.create_journal(&doc, &meta()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_negative_amount_rejected() {
        let h = Harness::new().await;
        let doc = SourceDocument::Sale(sale(dec!(-1000), dec!(0), "CASH"));

        let err = h.service.create_journal(&doc, &meta()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation { field: Some(ref f), .. } if f == "subtotal"));
    }
}

// ============================================================================
// Posting Tests
// ============================================================================

mod posting_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let h = Harness::new().await;
        let doc = SourceDocument::Sale(sale(dec!(1000000), dec!(110000), "CASH"));

        let first = h.service.create_journal(&doc, &meta()).await.unwrap();
        let second = h.service.create_journal(&doc, &meta()).await.unwrap();

        assert!(matches!(second, PostOutcome::AlreadyPosted { entry_id } if Some(entry_id) == first.entry_id()));
        assert_eq!(h.store.entry_count().await, 1);
        assert_eq!(h.balance("1101").await, dec!(1110000));
    }

    #[tokio::test]
    async fn test_strict_create_conflicts() {
        let h = Harness::new().await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0), "CASH"));

        h.service.create_journal(&doc, &meta()).await.unwrap();
        let err = h.service.create_journal_strict(&doc, &meta()).await.unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(h.store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_status_without_journal_is_not_posted() {
        let h = Harness::new().await;
        let mut doc = sale(dec!(1000), dec!(0), "CASH");
        doc.status = DocumentStatus::Draft;

        let outcome = h.service.create_journal(&doc.into(), &meta()).await.unwrap();
        assert_eq!(outcome, PostOutcome::NotRequired { status: DocumentStatus::Draft });
        assert_eq!(h.store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_line_failure_leaves_no_partial_entry() {
        let h = Harness::new().await;
        h.store
            .inject(Faults {
                fail_line_insert_after: Some(1),
                ..Default::default()
            })
            .await;
        let doc = SourceDocument::Sale(sale(dec!(1000000), dec!(110000), "CASH"));

        assert!(h.service.create_journal(&doc, &meta()).await.is_err());
        assert_eq!(h.store.entry_count().await, 0);
        assert_eq!(h.store.line_count().await, 0);
        assert_eq!(h.balance("1101").await, dec!(0));
    }

    #[tokio::test]
    async fn test_flip_failure_leaves_no_draft() {
        let h = Harness::new().await;
        h.store
            .inject(Faults {
                fail_mark_posted: true,
                ..Default::default()
            })
            .await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0), "CASH"));

        assert!(h.service.create_journal(&doc, &meta()).await.is_err());
        assert_eq!(h.store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_entry_number_collision_retries_with_suffix() {
        let h = Harness::new().await;
        h.store
            .inject(Faults {
                entry_number_collisions: 2,
                ..Default::default()
            })
            .await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0), "CASH"));

        let outcome = h.service.create_journal(&doc, &meta()).await.unwrap();
        let (entry, _, _) = posted(&outcome);
        assert!(entry.entry_number.ends_with("-2"));
    }

    #[tokio::test]
    async fn test_entry_number_attempts_are_capped() {
        let h = Harness::new().await;
        h.store
            .inject(Faults {
                entry_number_collisions: 5,
                ..Default::default()
            })
            .await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0), "CASH"));

        let err = h.service.create_journal(&doc, &meta()).await.unwrap_err();
        assert!(matches!(err, LedgerError::EntryNumberExhausted { attempts: 5 }));
    }

    #[tokio::test]
    async fn test_lost_race_is_already_posted() {
        let h = Harness::new().await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0), "CASH"));
        let first = h.service.create_journal(&doc, &meta()).await.unwrap();

        // both lookups before the write miss the winner
        h.store
            .inject(Faults {
                stale_source_lookups: 2,
                ..Default::default()
            })
            .await;
        let second = h.service.create_journal(&doc, &meta()).await.unwrap();

        assert!(matches!(second, PostOutcome::AlreadyPosted { entry_id } if Some(entry_id) == first.entry_id()));
        assert_eq!(h.store.entries_for(SourceType::Sale, doc.source_id()).await.len(), 1);
        assert_eq!(h.balance("1101").await, dec!(1000));
    }

    #[tokio::test]
    async fn test_delete_restores_balances() {
        let h = Harness::new().await;
        let doc = SourceDocument::Sale(sale(dec!(1000000), dec!(110000), "CASH"));
        h.service.create_journal(&doc, &meta()).await.unwrap();

        let removed = h
            .service
            .delete_journal(SourceType::Sale, doc.source_id(), &meta())
            .await
            .unwrap()
            .expect("entry removed");

        assert_eq!(removed.line_count, 3);
        assert_eq!(h.store.entry_count().await, 0);
        assert_eq!(h.store.line_count().await, 0);
        for code in ["1101", "4101", "2103", "1000", "1100", "2000", "4000"] {
            assert_eq!(h.balance(code).await, dec!(0), "balance of {}", code);
        }
        assert_eq!(h.register_balance(h.cash_register).await, dec!(0));
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let h = Harness::new().await;
        let removed = h
            .service
            .delete_journal(SourceType::Purchase, SourceId::new(), &meta())
            .await
            .unwrap();
        assert!(removed.is_none());
    }
}

// ============================================================================
// Propagation Tests
// ============================================================================

mod propagation_tests {
    use super::*;

    #[tokio::test]
    async fn test_headers_roll_up() {
        let h = Harness::new().await;
        let doc = SourceDocument::Sale(sale(dec!(1000000), dec!(110000), "CASH"));
        h.service.create_journal(&doc, &meta()).await.unwrap();

        assert_eq!(h.balance("1100").await, dec!(1110000));
        assert_eq!(h.balance("1000").await, dec!(1110000));
        assert_eq!(h.balance("2100").await, dec!(110000));
        assert_eq!(h.balance("4000").await, dec!(1000000));
        assert_eq!(h.register_balance(h.cash_register).await, dec!(1110000));
        assert_eq!(h.trial_balance().await, dec!(0));
    }

    #[tokio::test]
    async fn test_register_sync_failure_is_soft() {
        let h = Harness::new().await;
        h.store
            .inject(Faults {
                fail_cash_bank_sync: true,
                ..Default::default()
            })
            .await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0), "CASH"));

        let outcome = h.service.create_journal(&doc, &meta()).await.unwrap();
        let (_, _, events) = posted(&outcome);

        assert!(events.iter().any(|e| matches!(e, LedgerEvent::SubledgerSyncFailed { .. })));
        assert_eq!(h.balance("1101").await, dec!(1000));
        assert_eq!(h.register_balance(h.cash_register).await, dec!(0));
    }

    #[tokio::test]
    async fn test_rollup_failure_is_soft() {
        let h = Harness::new().await;
        let header = h.store.account("1100").await.unwrap();
        h.store
            .inject(Faults {
                fail_account_save: Some(header.id),
                ..Default::default()
            })
            .await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0), "CASH"));

        let outcome = h.service.create_journal(&doc, &meta()).await.unwrap();
        let (_, _, events) = posted(&outcome);

        assert!(events.iter().any(|e| matches!(e, LedgerEvent::RollupFailed { .. })));
        assert_eq!(h.balance("1101").await, dec!(1000));
        assert_eq!(h.balance("1100").await, dec!(0));
    }

    #[tokio::test]
    async fn test_type_mismatch_surfaces_event() {
        let h = Harness::new().await;
        let odd = Account::new(AccountId::new(), "1399", "Misfiled", AccountType::Expense, Currency::IDR);
        h.store.seed(vec![odd.clone()], vec![]).await;
        let mut doc = purchase(dec!(1000), TaxBreakdown::default(), "CASH");
        doc.items = vec![DocumentItem::new(None, "Misc", dec!(1), dec!(1000)).with_expense_account(odd.id)];

        let outcome = h.service.create_journal(&doc.into(), &meta()).await.unwrap();
        let (_, _, events) = posted(&outcome);

        assert!(events.iter().any(|e| matches!(
            e,
            LedgerEvent::AccountTypeMismatch { expected: AccountType::Asset, declared: AccountType::Expense, .. }
        )));
    }

    #[tokio::test]
    async fn test_locked_accounts_come_back_in_id_order() {
        let h = Harness::new().await;
        let cash = h.store.account("1101").await.unwrap();
        let sales = h.store.account("4101").await.unwrap();
        let mut uow = h.store.begin().await.unwrap();

        let locked = uow
            .lock_accounts(&[sales.id, cash.id, sales.id, AccountId::new()])
            .await
            .unwrap();
        uow.rollback().await.unwrap();

        let mut expected = vec![cash.id, sales.id];
        expected.sort();
        assert_eq!(locked.iter().map(|a| a.id).collect::<Vec<_>>(), expected);
    }
}

// ============================================================================
// Transition Tests
// ============================================================================

mod transition_tests {
    use super::*;

    #[tokio::test]
    async fn test_invoice_lifecycle() {
        let h = Harness::new().await;
        let mut doc = sale(dec!(1000000), dec!(110000), "CASH");
        doc.status = DocumentStatus::Invoiced;

        let created = h
            .service
            .update_journal(&doc.clone().into(), &DocumentStatus::Draft, &meta())
            .await
            .unwrap();
        assert_eq!(created.action, TransitionAction::Create);
        let first_id = created.posted.as_ref().and_then(PostOutcome::entry_id).unwrap();

        doc.status = DocumentStatus::Paid;
        let replaced = h
            .service
            .update_journal(&doc.clone().into(), &DocumentStatus::Invoiced, &meta())
            .await
            .unwrap();
        assert_eq!(replaced.action, TransitionAction::Replace);
        assert_eq!(replaced.removed.as_ref().map(|r| r.entry_id), Some(first_id));
        assert_ne!(replaced.posted.as_ref().and_then(PostOutcome::entry_id), Some(first_id));
        assert_eq!(h.store.entries_for(SourceType::Sale, doc.id).await.len(), 1);
        assert_eq!(h.balance("1101").await, dec!(1110000));

        doc.status = DocumentStatus::Cancelled;
        let deleted = h
            .service
            .update_journal(&doc.clone().into(), &DocumentStatus::Paid, &meta())
            .await
            .unwrap();
        assert_eq!(deleted.action, TransitionAction::Delete);
        assert_eq!(h.store.entry_count().await, 0);
        assert_eq!(h.balance("1101").await, dec!(0));
        assert_eq!(h.balance("1000").await, dec!(0));
    }

    #[tokio::test]
    async fn test_irrelevant_transition_does_nothing() {
        let h = Harness::new().await;
        let mut doc = sale(dec!(1000), dec!(0), "CASH");
        doc.status = DocumentStatus::Confirmed;

        let outcome = h
            .service
            .update_journal(&doc.into(), &DocumentStatus::Draft, &meta())
            .await
            .unwrap();
        assert_eq!(outcome.action, TransitionAction::None);
        assert_eq!(h.store.entry_count().await, 0);
    }
}

// ============================================================================
// Reconciliation Tests
// ============================================================================

mod reconciliation_tests {
    use super::*;

    async fn posted_harness() -> Harness {
        let h = Harness::new().await;
        let doc = SourceDocument::Sale(sale(dec!(1000000), dec!(110000), "CASH"));
        h.service.create_journal(&doc, &meta()).await.unwrap();
        h
    }

    #[tokio::test]
    async fn test_clean_ledger_is_consistent() {
        let h = posted_harness().await;
        let report = h.engine.verify_integrity().await.unwrap();
        assert!(report.consistent, "{:?}", report.mismatches);
        let leaves = h.store.accounts().await.iter().filter(|a| !a.is_header).count();
        assert_eq!(report.checked_accounts, leaves);
        assert!(report.hierarchy_issues.is_empty());
    }

    #[tokio::test]
    async fn test_drift_detected_and_repaired() {
        let h = posted_harness().await;
        h.store.set_account_balance("1101", Money::new(dec!(999), Currency::IDR)).await;

        let report = h.engine.verify_integrity().await.unwrap();
        assert!(!report.consistent);
        assert_eq!(report.mismatches_of(MismatchKind::CachedBalance).count(), 1);
        assert_eq!(report.mismatches_of(MismatchKind::HeaderAggregate).count(), 1);
        assert_eq!(report.mismatches_of(MismatchKind::SubledgerMirror).count(), 1);

        let dry = h.engine.reconcile(ReconcileStrategy::ToLedger, true, None).await.unwrap();
        assert_eq!(dry.applied, 0);
        let item = dry.items.iter().find(|i| i.account_code == "1101").unwrap();
        assert_eq!(item.status, ReconcileStatus::Variance);
        assert_eq!(item.target, dec!(1110000));
        assert_eq!(h.balance("1101").await, dec!(999));

        let applied = h.engine.reconcile(ReconcileStrategy::ToLedger, false, None).await.unwrap();
        assert_eq!(applied.applied, 1);
        assert_eq!(h.balance("1101").await, dec!(1110000));
        assert!(h.engine.verify_integrity().await.unwrap().consistent);
    }

    #[tokio::test]
    async fn test_drift_on_account_without_lines_repaired() {
        let h = posted_harness().await;
        h.store.set_account_balance("6201", Money::new(dec!(500), Currency::IDR)).await;
        h.store.set_account_balance("6000", Money::new(dec!(500), Currency::IDR)).await;

        let report = h.engine.verify_integrity().await.unwrap();
        assert!(!report.consistent);
        let drift = report.mismatches_of(MismatchKind::CachedBalance).next().unwrap();
        assert_eq!(drift.reference, "6201");
        assert_eq!(drift.expected, dec!(0));

        let result = h.engine.reconcile(ReconcileStrategy::ToLedger, false, None).await.unwrap();
        assert_eq!(result.applied, 1);
        assert_eq!(h.balance("6201").await, dec!(0));
        assert_eq!(h.balance("6000").await, dec!(0));
        assert!(h.engine.verify_integrity().await.unwrap().consistent);
    }

    #[tokio::test]
    async fn test_header_only_drift_recomputed() {
        let h = posted_harness().await;
        h.store.set_account_balance("4000", Money::new(dec!(1), Currency::IDR)).await;

        let dry = h.engine.reconcile(ReconcileStrategy::ToLedger, true, None).await.unwrap();
        assert_eq!(dry.applied, 0);
        assert_eq!(dry.headers.len(), 1);
        assert_eq!(dry.headers[0].current.amount(), dec!(1000000));
        assert_eq!(h.balance("4000").await, dec!(1));

        let result = h.engine.reconcile(ReconcileStrategy::ToLedger, false, None).await.unwrap();
        assert_eq!(result.applied, 0);
        assert_eq!(result.headers.len(), 1);
        assert_eq!(h.balance("4000").await, dec!(1000000));
        assert!(h.engine.verify_integrity().await.unwrap().consistent);
    }

    #[tokio::test]
    async fn test_reconcile_to_subledger_transactions() {
        let h = Harness::new().await;
        h.store.record_cash_bank_transaction(h.bank_register, dec!(300000)).await;
        h.store.record_cash_bank_transaction(h.bank_register, dec!(-50000)).await;

        let result = h
            .engine
            .reconcile(ReconcileStrategy::ToSubledgerTransactionSum, false, None)
            .await
            .unwrap();

        let item = result.items.iter().find(|i| i.cash_bank_id == Some(h.bank_register)).unwrap();
        assert!(item.applied);
        assert_eq!(item.target, dec!(250000));
        assert_eq!(h.balance("1102").await, dec!(250000));
        assert_eq!(h.register_balance(h.bank_register).await, dec!(250000));
        assert_eq!(h.balance("1100").await, dec!(250000));
    }

    #[tokio::test]
    async fn test_reconcile_to_cached_fixes_register() {
        let h = posted_harness().await;
        h.store
            .set_cash_bank_balance(h.cash_register, Money::new(dec!(5), Currency::IDR))
            .await;

        let result = h.engine.reconcile(ReconcileStrategy::ToCurrentCached, false, None).await.unwrap();

        assert_eq!(result.applied, 1);
        assert_eq!(h.register_balance(h.cash_register).await, dec!(1110000));
    }

    #[tokio::test]
    async fn test_account_filter() {
        let h = posted_harness().await;
        h.store.set_account_balance("4101", Money::new(dec!(1), Currency::IDR)).await;
        let cash = h.store.account("1101").await.unwrap();

        let result = h
            .engine
            .reconcile(ReconcileStrategy::ToLedger, false, Some(&[cash.id]))
            .await
            .unwrap();

        assert_eq!(result.items.len(), 1);
        assert_eq!(h.balance("4101").await, dec!(1));
    }

    #[tokio::test]
    async fn test_minor_variance_within_tolerance() {
        let h = posted_harness().await;
        h.store
            .set_cash_bank_balance(h.cash_register, Money::new(dec!(1110000.005), Currency::IDR))
            .await;

        assert!(h.engine.verify_integrity().await.unwrap().consistent);
        let result = h.engine.reconcile(ReconcileStrategy::ToLedger, true, None).await.unwrap();
        let item = result.items.iter().find(|i| i.cash_bank_id == Some(h.cash_register)).unwrap();
        assert_eq!(item.status, ReconcileStatus::MinorVariance);
    }

    #[tokio::test]
    async fn test_structural_entry_problems_reported() {
        let h = posted_harness().await;
        let cash = h.store.account("1101").await.unwrap();
        let source_id = SourceId::new();
        let mut draft = JournalDraft::new(SourceType::Cogs, source_id, date(), Currency::IDR);
        draft.push(DraftLine::debit(cash.id, "1101", "Imported", Money::new(dec!(10), Currency::IDR)));
        // two posted headers for one source, neither balanced
        for n in 0..2 {
            let mut entry = JournalEntry::draft(&draft, format!("IMP-{}", n)).unwrap();
            entry.status = JournalStatus::Posted;
            h.store.insert_raw(entry, vec![]).await;
        }

        let report = h.engine.verify_integrity().await.unwrap();
        assert!(!report.consistent);
        assert_eq!(report.mismatches_of(MismatchKind::UnbalancedEntry).count(), 2);
        assert_eq!(report.mismatches_of(MismatchKind::DuplicatePosting).count(), 1);
    }

    #[tokio::test]
    async fn test_verify_deadline() {
        let h = posted_harness().await;
        assert!(h.engine.verify_integrity_within(Duration::from_secs(5)).await.is_ok());

        let held = h.store.begin().await.unwrap();
        let err = h
            .engine
            .verify_integrity_within(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Timeout { .. }));
        held.rollback().await.unwrap();
    }
}

// ============================================================================
// Scheduler Tests
// ============================================================================

mod scheduler_tests {
    use super::*;
    use tokio::sync::watch;

    #[tokio::test]
    async fn test_run_once_repairs_only_when_inconsistent() {
        let h = Harness::new().await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0), "CASH"));
        h.service.create_journal(&doc, &meta()).await.unwrap();
        let scheduler = ReconciliationScheduler::new(Arc::clone(&h.engine));

        assert!(matches!(scheduler.run_once().await.unwrap(), SyncRunOutcome::Healthy(_)));

        h.store.set_account_balance("4101", Money::new(dec!(0), Currency::IDR)).await;
        match scheduler.run_once().await.unwrap() {
            SyncRunOutcome::Repaired { result, .. } => assert_eq!(result.applied, 1),
            other => panic!("expected repair, got {:?}", other),
        }
        assert_eq!(h.balance("4101").await, dec!(1000));
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn test_run_once_converges_on_header_drift() {
        let h = Harness::new().await;
        let doc = SourceDocument::Sale(sale(dec!(1000), dec!(0), "CASH"));
        h.service.create_journal(&doc, &meta()).await.unwrap();
        h.store.set_account_balance("4000", Money::new(dec!(1), Currency::IDR)).await;
        let scheduler = ReconciliationScheduler::new(Arc::clone(&h.engine));

        match scheduler.run_once().await.unwrap() {
            SyncRunOutcome::Repaired { result, .. } => assert_eq!(result.headers.len(), 1),
            other => panic!("expected repair, got {:?}", other),
        }
        assert_eq!(h.balance("4000").await, dec!(1000));
        assert!(matches!(scheduler.run_once().await.unwrap(), SyncRunOutcome::Healthy(_)));
    }

    #[tokio::test]
    async fn test_overlapping_pass_is_skipped() {
        let h = Harness::new().await;
        let scheduler = ReconciliationScheduler::new(Arc::clone(&h.engine));

        let held = h.store.begin().await.unwrap();
        let background = scheduler.clone();
        let first = tokio::spawn(async move { background.run_once().await });
        while !scheduler.is_running() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(scheduler.run_once().await.unwrap(), SyncRunOutcome::Skipped));
        held.rollback().await.unwrap();
        assert!(matches!(first.await.unwrap().unwrap(), SyncRunOutcome::Healthy(_)));
    }

    #[tokio::test]
    async fn test_spawned_loop_stops_on_shutdown() {
        let h = Harness::new().await;
        let scheduler = ReconciliationScheduler::new(Arc::clone(&h.engine));
        let (tx, rx) = watch::channel(false);

        let handle = scheduler.spawn(Duration::from_millis(10), rx);
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler stopped")
            .unwrap();
    }
}

// ============================================================================
// Property Tests
// ============================================================================

mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_posted_sales_keep_trial_balance(
            subtotal in 1_000i64..10_000_000,
            vat_percent in 0i64..=11,
            shipping in 0i64..100_000,
            withholding in 0i64..1_000,
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let h = Harness::new().await;
                let subtotal = Decimal::from(subtotal);
                let vat = subtotal * Decimal::from(vat_percent) / dec!(100);
                let mut doc = sale(subtotal, vat, "KREDIT");
                doc.shipping = Decimal::from(shipping);
                doc.taxes.withholding_21 = Decimal::from(withholding);

                let outcome = h.service.create_journal(&doc.into(), &meta()).await.unwrap();
                let (entry, _, _) = posted(&outcome);
                prop_assert_eq!(entry.total_debit, entry.total_credit);
                prop_assert_eq!(h.trial_balance().await, Decimal::ZERO);
                Ok::<(), TestCaseError>(())
            })?;
        }

        #[test]
        fn prop_create_then_delete_restores_zero(
            amount in 1i64..5_000_000,
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async {
                let h = Harness::new().await;
                let doc = SourceDocument::from(payment(PaymentDirection::Received, Decimal::from(amount), "CASH", None));
                h.service.create_journal(&doc, &meta()).await.unwrap();
                h.service.delete_journal(doc.source_type(), doc.source_id(), &meta()).await.unwrap();

                for account in h.store.accounts().await {
                    prop_assert!(account.balance.is_zero(), "{} not zero", account.code);
                }
                Ok::<(), TestCaseError>(())
            })?;
        }
    }
}
