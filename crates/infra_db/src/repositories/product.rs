//! Product repository
//!
//! Unit costs used to value cost of goods sold.

use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use core_kernel::ProductId;
use domain_ledger::ProductCost;

use crate::error::DatabaseError;

/// Row of the `products` table
#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub product_id: Uuid,
    pub name: String,
    pub unit_cost: Decimal,
}

impl From<ProductRow> for ProductCost {
    fn from(row: ProductRow) -> Self {
        ProductCost {
            product_id: ProductId::from_uuid(row.product_id),
            name: row.name,
            unit_cost: row.unit_cost,
        }
    }
}

/// Repository for product costs
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: PgPool,
}

impl ProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, product_id: ProductId) -> Result<Option<ProductRow>, DatabaseError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT product_id, name, unit_cost
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(Uuid::from(product_id))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Inserts a product and returns its id
    pub async fn insert(&self, name: &str, unit_cost: Decimal) -> Result<ProductId, DatabaseError> {
        let product_id = ProductId::new_v7();
        sqlx::query("INSERT INTO products (product_id, name, unit_cost) VALUES ($1, $2, $3)")
            .bind(Uuid::from(product_id))
            .bind(name)
            .bind(unit_cost)
            .execute(&self.pool)
            .await?;
        Ok(product_id)
    }
}
