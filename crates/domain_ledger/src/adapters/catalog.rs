//! In-memory product catalog

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use core_kernel::{DomainPort, PortError, ProductId};

use crate::ports::{ProductCost, ProductCostLookup};

/// Product costs held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductCost>>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog from known costs
    pub fn from_costs(costs: impl IntoIterator<Item = ProductCost>) -> Self {
        let products = costs.into_iter().map(|c| (c.product_id, c)).collect();
        Self {
            products: Arc::new(RwLock::new(products)),
        }
    }

    /// Adds or replaces a product, returning its id
    pub async fn add(&self, name: impl Into<String>, unit_cost: Decimal) -> ProductId {
        let product_id = ProductId::new_v7();
        self.products.write().await.insert(
            product_id,
            ProductCost {
                product_id,
                name: name.into(),
                unit_cost,
            },
        );
        product_id
    }
}

impl DomainPort for InMemoryProductCatalog {}

#[async_trait]
impl ProductCostLookup for InMemoryProductCatalog {
    async fn unit_cost(&self, product_id: ProductId) -> Result<Option<ProductCost>, PortError> {
        Ok(self.products.read().await.get(&product_id).cloned())
    }
}
