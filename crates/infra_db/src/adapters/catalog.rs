//! Product cost lookup backed by the `products` table

use std::time::Instant;

use async_trait::async_trait;
use sqlx::PgPool;

use core_kernel::{DomainPort, HealthCheckResult, HealthCheckable, PortError, ProductId};
use domain_ledger::{ProductCost, ProductCostLookup};

use crate::repositories::ProductRepository;

/// PostgreSQL implementation of [`ProductCostLookup`]
#[derive(Debug, Clone)]
pub struct PostgresProductCatalog {
    repository: ProductRepository,
    pool: PgPool,
}

impl PostgresProductCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: ProductRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn repository(&self) -> &ProductRepository {
        &self.repository
    }
}

impl DomainPort for PostgresProductCatalog {}

#[async_trait]
impl HealthCheckable for PostgresProductCatalog {
    async fn health_check(&self) -> HealthCheckResult {
        let started = Instant::now();
        let probe = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
            .map(|_| ());
        HealthCheckResult::from_probe("postgres-product-catalog", started, probe)
    }
}

#[async_trait]
impl ProductCostLookup for PostgresProductCatalog {
    async fn unit_cost(&self, product_id: ProductId) -> Result<Option<ProductCost>, PortError> {
        let row = self.repository.find(product_id).await?;
        Ok(row.map(ProductCost::from))
    }
}
