//! PostgreSQL integration tests for the ledger store
//!
//! These start a container per test and are ignored by default:
//!
//! ```bash
//! cargo test -p test_utils -- --ignored
//! ```

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;

use core_kernel::{AdapterHealth, HealthCheckable};
use domain_ledger::{
    DocumentStatus, JournalService, LedgerError, LedgerSettings, MismatchKind, PaymentMethod,
    PostOutcome, ProductCostLookup, ReconcileStrategy, ReconciliationEngine, ReconciliationSettings,
    SourceType,
};
use test_utils::{
    assert_consistent, assert_entry_balanced, assert_mismatch_count, db_test, DatabaseTestAssertions,
    MetaFixtures, SalesDocumentBuilder, TestDatabase,
};

fn service(db: &TestDatabase) -> JournalService {
    JournalService::new(
        Arc::new(db.ledger_store()),
        Arc::new(db.product_catalog()),
        LedgerSettings::default(),
    )
}

fn engine(db: &TestDatabase) -> ReconciliationEngine {
    ReconciliationEngine::new(
        Arc::new(db.ledger_store()),
        ReconciliationSettings::default(),
        core_kernel::Currency::IDR,
        5,
    )
}

async fn balance(pool: &PgPool, code: &str) -> Decimal {
    sqlx::query_scalar::<_, Decimal>("SELECT balance FROM accounts WHERE code = $1")
        .bind(code)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn posted_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM journal_entries WHERE status = 'POSTED'")
        .fetch_one(pool)
        .await
        .unwrap()
}

// ============================================================================
// Posting Tests
// ============================================================================

mod posting_tests {
    use super::*;

    db_test!(test_cash_sale_posts_and_propagates, |db| {
        db.seed_standard_chart().await.unwrap();
        let doc = SalesDocumentBuilder::new().build_source();

        let outcome = service(&db).create_journal(&doc, &MetaFixtures::operator()).await.unwrap();
        let receipt = outcome.receipt().expect("posted");

        assert_entry_balanced(&receipt.entry, &receipt.lines);
        assert_eq!(balance(db.pool(), "1101").await, dec!(1110000));
        assert_eq!(balance(db.pool(), "4101").await, dec!(1000000));
        assert_eq!(balance(db.pool(), "2103").await, dec!(110000));
        assert_eq!(balance(db.pool(), "1000").await, dec!(1110000));
        assert_consistent(&engine(&db).verify_integrity().await.unwrap());
    });

    db_test!(test_repeat_create_is_idempotent, |db| {
        db.seed_standard_chart().await.unwrap();
        let service = service(&db);
        let doc = SalesDocumentBuilder::new().build_source();

        let first = service.create_journal(&doc, &MetaFixtures::operator()).await.unwrap();
        let second = service.create_journal(&doc, &MetaFixtures::operator()).await.unwrap();

        assert_eq!(second, PostOutcome::AlreadyPosted { entry_id: first.entry_id().unwrap() });
        assert_eq!(posted_count(db.pool()).await, 1);
        assert_eq!(balance(db.pool(), "1101").await, dec!(1110000));
    });

    db_test!(test_strict_create_conflicts_and_keeps_transaction_clean, |db| {
        db.seed_standard_chart().await.unwrap();
        let service = service(&db);
        let doc = SalesDocumentBuilder::new().build_source();
        service.create_journal(&doc, &MetaFixtures::operator()).await.unwrap();

        let err = service.create_journal_strict(&doc, &MetaFixtures::operator()).await.unwrap_err();

        assert!(matches!(err, LedgerError::Conflict { .. }));
        assert_eq!(balance(db.pool(), "1101").await, dec!(1110000));
    });

    db_test!(test_concurrent_posts_of_one_source_yield_one_entry, |db| {
        db.seed_standard_chart().await.unwrap();
        let doc = SalesDocumentBuilder::new().build_source();

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let service = service(&db);
            let doc = doc.clone();
            tasks.push(tokio::spawn(async move {
                service.create_journal(&doc, &MetaFixtures::operator()).await
            }));
        }
        let mut posted = 0;
        for task in tasks {
            if let PostOutcome::Posted(_) = task.await.unwrap().unwrap() {
                posted += 1;
            }
        }

        assert_eq!(posted, 1);
        assert_eq!(posted_count(db.pool()).await, 1);
        assert_eq!(balance(db.pool(), "1101").await, dec!(1110000));
        assert_consistent(&engine(&db).verify_integrity().await.unwrap());
    });

    db_test!(test_sale_with_product_posts_inline_cogs, |db| {
        db.seed_standard_chart().await.unwrap();
        let catalog = db.product_catalog();
        let product = catalog.repository().insert("Widget", dec!(300000)).await.unwrap();
        assert_eq!(catalog.unit_cost(product).await.unwrap().unwrap().unit_cost, dec!(300000));

        let doc = SalesDocumentBuilder::new()
            .with_product(product, dec!(2), dec!(500000))
            .build_source();
        service(&db).create_journal(&doc, &MetaFixtures::operator()).await.unwrap();

        assert_eq!(balance(db.pool(), "5101").await, dec!(600000));
        assert_eq!(balance(db.pool(), "1301").await, dec!(-600000));
    });
}

// ============================================================================
// Transition Tests
// ============================================================================

mod transition_tests {
    use super::*;

    db_test!(test_cancel_removes_entry_and_reverses_balances, |db| {
        db.seed_standard_chart().await.unwrap();
        let service = service(&db);
        let sale = SalesDocumentBuilder::new().with_payment_method(PaymentMethod::Credit);
        let invoiced = sale.build();
        let doc = domain_ledger::SourceDocument::Sale(invoiced.clone());
        service.create_journal(&doc, &MetaFixtures::operator()).await.unwrap();
        assert_eq!(balance(db.pool(), "1201").await, dec!(1110000));

        let mut cancelled = invoiced;
        cancelled.status = DocumentStatus::Cancelled;
        service
            .update_journal(
                &domain_ledger::SourceDocument::Sale(cancelled),
                &DocumentStatus::Invoiced,
                &MetaFixtures::operator(),
            )
            .await
            .unwrap();

        assert_eq!(posted_count(db.pool()).await, 0);
        assert_eq!(balance(db.pool(), "1201").await, dec!(0));
        assert_eq!(balance(db.pool(), "4101").await, dec!(0));
    });

    db_test!(test_delete_without_entry_is_noop, |db| {
        db.seed_standard_chart().await.unwrap();

        let removed = service(&db)
            .delete_journal(SourceType::Sale, core_kernel::SourceId::new(), &MetaFixtures::operator())
            .await
            .unwrap();

        assert!(removed.is_none());
    });
}

// ============================================================================
// Reconciliation Tests
// ============================================================================

mod reconciliation_tests {
    use super::*;

    db_test!(test_drift_detected_and_repaired, |db| {
        db.seed_standard_chart().await.unwrap();
        let doc = SalesDocumentBuilder::new().build_source();
        service(&db).create_journal(&doc, &MetaFixtures::operator()).await.unwrap();

        sqlx::query("UPDATE accounts SET balance = 5 WHERE code = '4101'")
            .execute(db.pool())
            .await
            .unwrap()
            .assert_rows_affected(1);

        let engine = engine(&db);
        let report = engine.verify_integrity().await.unwrap();
        assert_mismatch_count(&report, MismatchKind::CachedBalance, 1);

        let result = engine.reconcile(ReconcileStrategy::ToLedger, false, None).await.unwrap();
        assert!(result.applied >= 1);
        assert_eq!(balance(db.pool(), "4101").await, dec!(1000000));
        assert_consistent(&engine.verify_integrity().await.unwrap());
    });

    db_test!(test_reconcile_to_transaction_sum, |db| {
        let (_, registers) = db.seed_standard_chart().await.unwrap();
        let store = db.ledger_store();
        store
            .record_cash_bank_transaction(registers[1].id, test_utils::DateFixtures::posting_date(), dec!(750000), Some("opening deposit"))
            .await
            .unwrap();

        let result = engine(&db)
            .reconcile(ReconcileStrategy::ToSubledgerTransactionSum, false, None)
            .await
            .unwrap();

        assert_eq!(result.applied, 1);
        assert_eq!(balance(db.pool(), "1102").await, dec!(750000));
        let mirrored: Decimal = sqlx::query_scalar("SELECT balance FROM cash_bank_accounts WHERE code = 'BNK-001'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(mirrored, dec!(750000));
    });

    db_test!(test_health_check_reports_healthy, |db| {
        let health = db.ledger_store().health_check().await;
        assert_eq!(health.status, AdapterHealth::Healthy);
        assert_eq!(health.adapter_id, "postgres-ledger-store");
    });
}
