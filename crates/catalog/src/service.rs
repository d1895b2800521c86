//! Product service: cache-aside reads and ledger mutations.

use std::collections::BTreeSet;
use std::time::Duration;

use common::ProductId;
use domain::{NewProduct, Product, StockCheck, StockDelta, StockLevel, StockRequirement};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::{CacheBackend, CacheConfig, keys};
use crate::error::{CatalogError, Result};
use crate::store::{ListQuery, ProductPage, ProductStore, SalesLevel, SearchQuery};

/// Service for reading and mutating the catalog.
///
/// Cache failures never fail a call: reads fall through to the store and
/// invalidation problems are logged.
pub struct ProductService<S, C> {
    store: S,
    cache: C,
    config: CacheConfig,
}

impl<S: ProductStore, C: CacheBackend> ProductService<S, C> {
    /// Creates a new product service with default cache expiry.
    pub fn new(store: S, cache: C) -> Self {
        Self::with_config(store, cache, CacheConfig::default())
    }

    /// Creates a new product service with explicit cache expiry.
    pub fn with_config(store: S, cache: C, config: CacheConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns an active product.
    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        if !id.is_valid() {
            return Err(CatalogError::Validation("invalid product id".to_string()));
        }

        let key = keys::detail(id);
        if let Some(product) = self.cached::<Product>(&key, "detail").await {
            return Ok(product);
        }

        let product = self
            .store
            .find(id)
            .await?
            .filter(|p| p.status.is_active())
            .ok_or(CatalogError::ProductNotFound(id))?;

        self.put_cached(&key, &product, self.config.product_ttl).await;
        Ok(product)
    }

    /// Lists active products, optionally within one category.
    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self, query: ListQuery) -> Result<ProductPage> {
        let query = query.normalized();

        // The version must be read before the store so a concurrent bump
        // orphans whatever this call caches.
        let version = self.current_version(&keys::list_version(&query)).await;
        let key = version.map(|v| keys::list(v, &query));

        if let Some(key) = &key
            && let Some(page) = self.cached::<ProductPage>(key, "list").await
        {
            return Ok(page);
        }

        let page = self.store.list(&query).await?;
        if let Some(key) = &key {
            self.put_cached(key, &page, self.config.list_ttl).await;
        }
        Ok(page)
    }

    /// Searches active products by keyword.
    #[tracing::instrument(skip(self))]
    pub async fn search_products(&self, query: SearchQuery) -> Result<ProductPage> {
        let query = query.normalized();
        if query.keyword.is_empty() {
            return Err(CatalogError::Validation("keyword is required".to_string()));
        }

        let version = self.current_version(keys::GLOBAL_VERSION).await;
        let key = version.map(|v| keys::search(v, &query));

        if let Some(key) = &key
            && let Some(page) = self.cached::<ProductPage>(key, "search").await
        {
            return Ok(page);
        }

        let page = self.store.search(&query).await?;
        if let Some(key) = &key {
            self.put_cached(key, &page, self.config.search_ttl).await;
        }
        Ok(page)
    }

    /// Adds a product to the catalog.
    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    pub async fn add_product(&self, product: NewProduct) -> Result<Product> {
        product.validate()?;
        let product = self.store.insert(product).await?;
        tracing::info!(product_id = %product.id, category = %product.category, "product added");

        self.invalidate(&[product.id], [product.category.as_str()]).await;
        Ok(product)
    }

    /// Edits a product's descriptive fields. Stock and sales are untouched.
    #[tracing::instrument(skip(self, fields))]
    pub async fn update_product(&self, id: ProductId, fields: NewProduct) -> Result<Product> {
        if !id.is_valid() {
            return Err(CatalogError::Validation("invalid product id".to_string()));
        }
        fields.validate()?;

        let before = self
            .store
            .find(id)
            .await?
            .ok_or(CatalogError::ProductNotFound(id))?;
        let after = self
            .store
            .update(id, fields)
            .await?
            .ok_or(CatalogError::ProductNotFound(id))?;

        tracing::info!(product_id = %id, "product updated");
        self.invalidate(&[id], [before.category.as_str(), after.category.as_str()])
            .await;
        Ok(after)
    }

    /// Applies every delta or none.
    #[tracing::instrument(skip(self, deltas), fields(items = deltas.len()))]
    pub async fn batch_update_stock(&self, deltas: &[StockDelta]) -> Result<Vec<StockLevel>> {
        if deltas.is_empty() {
            return Err(CatalogError::Validation("no items to update".to_string()));
        }
        if deltas.iter().any(|d| !d.product_id.is_valid()) {
            return Err(CatalogError::Validation("invalid product id".to_string()));
        }

        let levels = match self.store.batch_update_stock(deltas).await {
            Ok(levels) => levels,
            Err(e) => {
                metrics::counter!("stock_batch_updates_total", "outcome" => "rejected")
                    .increment(1);
                tracing::warn!(error = %e, "batch stock update rejected");
                return Err(e);
            }
        };
        metrics::counter!("stock_batch_updates_total", "outcome" => "applied").increment(1);
        tracing::info!(products = levels.len(), "batch stock updated");

        let ids: Vec<ProductId> = levels.iter().map(|l| l.product_id).collect();
        self.invalidate(&ids, levels.iter().map(|l| l.category.as_str()))
            .await;
        Ok(levels)
    }

    /// Applies one guarded delta.
    #[tracing::instrument(skip(self))]
    pub async fn update_stock(&self, delta: StockDelta) -> Result<StockLevel> {
        if !delta.product_id.is_valid() {
            return Err(CatalogError::Validation("invalid product id".to_string()));
        }
        let level = self.store.update_stock(delta).await?;
        tracing::info!(product_id = %level.product_id, stock = level.stock, "stock updated");

        self.invalidate(&[level.product_id], [level.category.as_str()])
            .await;
        Ok(level)
    }

    /// Reports whether each requirement can be met right now.
    ///
    /// Advisory only: nothing is reserved, and a later deduction may still
    /// fail. A requirement of zero just reports the current stock.
    #[tracing::instrument(skip(self, requirements), fields(items = requirements.len()))]
    pub async fn check_stock(&self, requirements: &[StockRequirement]) -> Result<StockCheck> {
        if requirements.is_empty() {
            return Err(CatalogError::Validation("no items to check".to_string()));
        }
        if requirements
            .iter()
            .any(|r| !r.product_id.is_valid() || r.required < 0)
        {
            return Err(CatalogError::Validation(
                "each item needs a valid product id and a non-negative quantity".to_string(),
            ));
        }

        let ids: Vec<ProductId> = requirements.iter().map(|r| r.product_id).collect();
        let levels = self.store.stock_levels(&ids).await?;
        Ok(StockCheck::evaluate(requirements, |id| {
            levels.get(&id).copied()
        }))
    }

    /// Adds to a product's sales counter.
    #[tracing::instrument(skip(self))]
    pub async fn increment_sales(&self, id: ProductId, quantity: i64) -> Result<SalesLevel> {
        if !id.is_valid() {
            return Err(CatalogError::Validation("invalid product id".to_string()));
        }
        if quantity <= 0 {
            return Err(CatalogError::Validation(
                "quantity must be positive".to_string(),
            ));
        }

        let level = self
            .store
            .increment_sales(id, quantity)
            .await?
            .ok_or(CatalogError::ProductNotFound(id))?;
        tracing::info!(product_id = %id, sales = level.sales, "sales incremented");

        self.invalidate(&[id], [level.category.as_str()]).await;
        Ok(level)
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str, kind: &'static str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    metrics::counter!("catalog_cache_hits_total", "kind" => kind).increment(1);
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => {
                metrics::counter!("catalog_cache_misses_total", "kind" => kind).increment(1);
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn put_cached<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "cannot serialize cache entry");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, &raw, Some(ttl)).await {
            tracing::warn!(key, error = %e, "cache write failed");
        }
    }

    /// Reads a version counter, initialising it to 1 when absent.
    ///
    /// Returns `None` when the cache is unreachable; the caller then skips
    /// caching altogether.
    async fn current_version(&self, key: &str) -> Option<i64> {
        let read = |raw: Option<String>| raw.and_then(|v| v.parse::<i64>().ok());

        match self.cache.get(key).await {
            Ok(raw) => {
                if let Some(version) = read(raw) {
                    return Some(version);
                }
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "version read failed");
                return None;
            }
        }

        if let Err(e) = self
            .cache
            .set_if_absent(key, "1", Some(self.config.version_ttl))
            .await
        {
            tracing::warn!(key, error = %e, "version init failed");
            return None;
        }
        // Re-read: a concurrent bump may have won the race to create it.
        match self.cache.get(key).await {
            Ok(raw) => read(raw),
            Err(e) => {
                tracing::warn!(key, error = %e, "version read failed");
                None
            }
        }
    }

    /// Drops detail entries and bumps the affected category versions plus
    /// the global version.
    async fn invalidate<'a>(
        &self,
        products: &[ProductId],
        categories: impl IntoIterator<Item = &'a str>,
    ) {
        for id in products {
            let key = keys::detail(*id);
            if let Err(e) = self.cache.delete(&key).await {
                tracing::warn!(key, error = %e, "detail eviction failed");
            }
        }

        let categories: BTreeSet<&str> = categories.into_iter().collect();
        let version_keys = categories
            .into_iter()
            .map(keys::category_version)
            .chain(std::iter::once(keys::GLOBAL_VERSION.to_string()));
        for key in version_keys {
            if let Err(e) = self.cache.incr(&key).await {
                tracing::warn!(key, error = %e, "version bump failed");
            }
        }
    }
}
