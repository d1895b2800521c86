//! Collaborators the order saga calls.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use cart::{CartService, CartStore, ProductCatalog};
use catalog::{CacheBackend, CatalogError, ProductService, ProductStore};
use common::{Money, ProductId, UserId};
use domain::StockDelta;

use crate::error::{Result, SagaError};

/// The catalog fields an order line copies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub image: String,
}

/// Product catalog and stock ledger as seen by the order saga.
#[async_trait]
pub trait ProductClient: Send + Sync {
    /// Returns the authoritative name, price and image of a product.
    async fn get_product(&self, id: ProductId) -> Result<ProductSnapshot>;

    /// Applies all deltas or none.
    async fn batch_update_stock(&self, deltas: &[StockDelta]) -> Result<()>;
}

/// Cart operations used after an order is placed.
#[async_trait]
pub trait CartClient: Send + Sync {
    /// Empties the user's cart.
    async fn clear_cart(&self, user_id: UserId) -> Result<()>;
}

#[async_trait]
impl<T: ProductClient + ?Sized> ProductClient for Arc<T> {
    async fn get_product(&self, id: ProductId) -> Result<ProductSnapshot> {
        (**self).get_product(id).await
    }

    async fn batch_update_stock(&self, deltas: &[StockDelta]) -> Result<()> {
        (**self).batch_update_stock(deltas).await
    }
}

#[async_trait]
impl<T: CartClient + ?Sized> CartClient for Arc<T> {
    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        (**self).clear_cart(user_id).await
    }
}

fn from_catalog(error: CatalogError) -> SagaError {
    match error {
        CatalogError::ProductNotFound(id) => SagaError::ProductNotFound(id),
        CatalogError::InsufficientStock { product_id, .. } => {
            SagaError::InsufficientStock(product_id)
        }
        other => SagaError::ProductService(other.to_string()),
    }
}

#[async_trait]
impl<S: ProductStore, C: CacheBackend> ProductClient for ProductService<S, C> {
    async fn get_product(&self, id: ProductId) -> Result<ProductSnapshot> {
        let product = ProductService::get_product(self, id)
            .await
            .map_err(from_catalog)?;
        Ok(ProductSnapshot {
            id: product.id,
            image: product.first_image().to_string(),
            name: product.name,
            price: product.price,
        })
    }

    async fn batch_update_stock(&self, deltas: &[StockDelta]) -> Result<()> {
        ProductService::batch_update_stock(self, deltas)
            .await
            .map(|_| ())
            .map_err(from_catalog)
    }
}

#[async_trait]
impl<S: CartStore, P: ProductCatalog> CartClient for CartService<S, P> {
    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        CartService::clear_cart(self, user_id)
            .await
            .map_err(|e| SagaError::CartService(e.to_string()))
    }
}

#[derive(Debug, Default)]
struct ProductState {
    products: HashMap<ProductId, (ProductSnapshot, i64)>,
    batch_calls: Vec<Vec<StockDelta>>,
    fail_on_get: bool,
    fail_on_deduct: bool,
    fail_on_restore: bool,
}

/// In-memory product client for testing.
///
/// Deductions are batches with any negative delta; restorations are batches
/// of positive deltas only. Each can be made to fail on its own.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductClient {
    state: Arc<RwLock<ProductState>>,
}

impl InMemoryProductClient {
    /// Creates a new client with no products.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a product with the given price in cents and stock.
    pub fn add_product(&self, id: i64, name: &str, price_cents: i64, stock: i64) -> ProductId {
        let id = ProductId::new(id);
        let snapshot = ProductSnapshot {
            id,
            name: name.to_string(),
            price: Money::from_cents(price_cents),
            image: format!("{}.png", name.to_lowercase()),
        };
        self.state
            .write()
            .unwrap()
            .products
            .insert(id, (snapshot, stock));
        id
    }

    /// Returns the current stock of a product.
    pub fn stock_of(&self, id: ProductId) -> Option<i64> {
        self.state
            .read()
            .unwrap()
            .products
            .get(&id)
            .map(|(_, stock)| *stock)
    }

    /// Returns every batch received, including refused ones.
    pub fn batch_calls(&self) -> Vec<Vec<StockDelta>> {
        self.state.read().unwrap().batch_calls.clone()
    }

    /// Makes product lookups fail.
    pub fn set_fail_on_get(&self, fail: bool) {
        self.state.write().unwrap().fail_on_get = fail;
    }

    /// Makes deductions fail without touching stock.
    pub fn set_fail_on_deduct(&self, fail: bool) {
        self.state.write().unwrap().fail_on_deduct = fail;
    }

    /// Makes restorations fail without touching stock.
    pub fn set_fail_on_restore(&self, fail: bool) {
        self.state.write().unwrap().fail_on_restore = fail;
    }
}

#[async_trait]
impl ProductClient for InMemoryProductClient {
    async fn get_product(&self, id: ProductId) -> Result<ProductSnapshot> {
        let state = self.state.read().unwrap();
        if state.fail_on_get {
            return Err(SagaError::ProductService("connection refused".to_string()));
        }
        state
            .products
            .get(&id)
            .map(|(snapshot, _)| snapshot.clone())
            .ok_or(SagaError::ProductNotFound(id))
    }

    async fn batch_update_stock(&self, deltas: &[StockDelta]) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.batch_calls.push(deltas.to_vec());

        let restoring = deltas.iter().all(|d| d.delta > 0);
        if restoring && state.fail_on_restore {
            return Err(SagaError::ProductService("stock restore timed out".to_string()));
        }
        if !restoring && state.fail_on_deduct {
            return Err(SagaError::ProductService("stock deduct timed out".to_string()));
        }

        let mut scratch: HashMap<ProductId, i64> = HashMap::new();
        for delta in deltas {
            let current = match scratch.get(&delta.product_id) {
                Some(stock) => *stock,
                None => state
                    .products
                    .get(&delta.product_id)
                    .map(|(_, stock)| *stock)
                    .ok_or(SagaError::InsufficientStock(delta.product_id))?,
            };
            let next = current + delta.delta;
            if next < 0 {
                return Err(SagaError::InsufficientStock(delta.product_id));
            }
            scratch.insert(delta.product_id, next);
        }
        for (id, stock) in scratch {
            if let Some(entry) = state.products.get_mut(&id) {
                entry.1 = stock;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CartState {
    cleared: Vec<UserId>,
    fail_on_clear: bool,
}

/// In-memory cart client for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartClient {
    state: Arc<RwLock<CartState>>,
}

impl InMemoryCartClient {
    /// Creates a new cart client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every clear fail.
    pub fn set_fail_on_clear(&self, fail: bool) {
        self.state.write().unwrap().fail_on_clear = fail;
    }

    /// Returns the users whose carts were cleared, in call order.
    pub fn cleared(&self) -> Vec<UserId> {
        self.state.read().unwrap().cleared.clone()
    }
}

#[async_trait]
impl CartClient for InMemoryCartClient {
    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_clear {
            return Err(SagaError::CartService("cart store unavailable".to_string()));
        }
        state.cleared.push(user_id);
        Ok(())
    }
}
