//! Throwaway PostgreSQL for the ledger integration tests
//!
//! Each [`TestDatabase`] owns a `postgres:16-alpine` container with the
//! migrations applied. Tests that use one need Docker and are marked ignored.

use std::time::Duration;

use sqlx::PgPool;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use core_kernel::Currency;
use domain_ledger::{Account, CashBankAccount};
use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresLedgerStore, PostgresProductCatalog};

use crate::fixtures::ChartFixtures;

const IMAGE: (&str, &str) = ("postgres", "16-alpine");
const USER: &str = "ledger";
const PASSWORD: &str = "ledger";
const DATABASE: &str = "ledger_test";
const READY_LINE: &str = "database system is ready to accept connections";

/// Tables wiped between scenarios, children first
const LEDGER_TABLES: &str =
    "journal_lines, journal_entries, cash_bank_transactions, cash_bank_accounts, products, accounts";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn connection_url(host: &str, port: u16) -> String {
    format!("postgres://{USER}:{PASSWORD}@{host}:{port}/{DATABASE}")
}

pub struct TestDatabase {
    _container: ContainerAsync<GenericImage>,
    pool: PgPool,
}

impl TestDatabase {
    /// Starts a container and migrates it
    pub async fn start() -> Result<Self, BoxError> {
        let container = GenericImage::new(IMAGE.0, IMAGE.1)
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(READY_LINE))
            .with_env_var("POSTGRES_USER", USER)
            .with_env_var("POSTGRES_PASSWORD", PASSWORD)
            .with_env_var("POSTGRES_DB", DATABASE)
            .start()
            .await?;

        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(5432).await?;
        let config = DatabaseConfig::new(connection_url(&host, port))
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .application_name("ledger-tests");

        let pool = create_pool(config).await?;
        run_migrations(&pool).await?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn ledger_store(&self) -> PostgresLedgerStore {
        PostgresLedgerStore::new(self.pool.clone(), Currency::IDR)
    }

    pub fn product_catalog(&self) -> PostgresProductCatalog {
        PostgresProductCatalog::new(self.pool.clone())
    }

    /// Empties the ledger and loads [`ChartFixtures::standard`]
    pub async fn seed_standard_chart(&self) -> Result<(Vec<Account>, Vec<CashBankAccount>), BoxError> {
        self.clear_data().await?;
        let (accounts, registers) = ChartFixtures::standard();
        self.ledger_store().seed_chart(&accounts, &registers).await?;
        Ok((accounts, registers))
    }

    pub async fn clear_data(&self) -> Result<(), BoxError> {
        sqlx::query(&format!("TRUNCATE TABLE {LEDGER_TABLES} CASCADE"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Declares an ignored `#[tokio::test]` that receives a fresh [`TestDatabase`]
#[macro_export]
macro_rules! db_test {
    ($name:ident, |$db:ident| $body:block) => {
        #[tokio::test]
        #[ignore = "requires docker"]
        async fn $name() {
            let $db = $crate::database::TestDatabase::start()
                .await
                .expect("start postgres container");
            $body
        }
    };
}

pub trait DatabaseTestAssertions {
    fn assert_rows_affected(&self, expected: u64);
}

impl DatabaseTestAssertions for sqlx::postgres::PgQueryResult {
    fn assert_rows_affected(&self, expected: u64) {
        assert_eq!(self.rows_affected(), expected, "unexpected number of rows affected");
    }
}
