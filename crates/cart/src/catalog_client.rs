//! What the cart needs from the product catalog.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use catalog::{CacheBackend, CatalogError, ProductService, ProductStore};
use common::ProductId;
use domain::{Product, StockRequirement};

use crate::error::{CartError, Result};

/// Product lookups used to snapshot and enrich cart lines.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Returns an active product.
    async fn get_product(&self, id: ProductId) -> Result<Product>;

    /// Returns the current stock of each known active product.
    async fn stock_levels(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, i64>>;
}

#[async_trait]
impl<T: ProductCatalog + ?Sized> ProductCatalog for Arc<T> {
    async fn get_product(&self, id: ProductId) -> Result<Product> {
        (**self).get_product(id).await
    }

    async fn stock_levels(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, i64>> {
        (**self).stock_levels(ids).await
    }
}

#[async_trait]
impl<S: ProductStore, C: CacheBackend> ProductCatalog for ProductService<S, C> {
    async fn get_product(&self, id: ProductId) -> Result<Product> {
        ProductService::get_product(self, id)
            .await
            .map_err(|e| match e {
                CatalogError::ProductNotFound(id) => CartError::ProductNotFound(id),
                other => CartError::Catalog(other.to_string()),
            })
    }

    async fn stock_levels(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, i64>> {
        let requirements: Vec<StockRequirement> = ids
            .iter()
            .map(|id| StockRequirement::new(*id, 0))
            .collect();
        let check = self
            .check_stock(&requirements)
            .await
            .map_err(|e| CartError::Catalog(e.to_string()))?;
        Ok(check
            .items
            .into_iter()
            .map(|item| (item.product_id, item.available_stock))
            .collect())
    }
}
