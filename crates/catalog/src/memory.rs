use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::ProductId;
use domain::{NewProduct, Product, StockDelta, StockLevel};
use tokio::sync::RwLock;

use crate::error::{CatalogError, Result};
use crate::store::{
    ListQuery, ProductPage, ProductStore, SalesLevel, SearchQuery, SortField, SortOrder,
};

#[derive(Debug, Default)]
struct State {
    products: BTreeMap<ProductId, Product>,
    next_id: i64,
}

/// In-memory product store for testing.
///
/// A single write lock around each mutation gives the same all-or-nothing
/// behavior as the database transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryProductStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stock of a product regardless of status.
    pub async fn stock_of(&self, id: ProductId) -> Option<i64> {
        self.state.read().await.products.get(&id).map(|p| p.stock)
    }

    /// Returns the number of stored products.
    pub async fn product_count(&self) -> usize {
        self.state.read().await.products.len()
    }
}

fn compare(a: &Product, b: &Product, field: SortField) -> std::cmp::Ordering {
    match field {
        SortField::Price => a.price.cmp(&b.price),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        SortField::Sales => a.sales.cmp(&b.sales),
    }
    .then(a.id.cmp(&b.id))
}

fn page_of(mut matches: Vec<Product>, page: u32, page_size: u32, offset: i64) -> ProductPage {
    let total = matches.len() as i64;
    let products = matches
        .drain(..)
        .skip(offset as usize)
        .take(page_size as usize)
        .collect();
    ProductPage {
        total,
        page,
        page_size,
        products,
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn insert(&self, product: NewProduct) -> Result<Product> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(state.next_id),
            name: product.name,
            description: product.description,
            price: product.price,
            stock: product.stock,
            sales: 0,
            category: product.category,
            images: product.images,
            status: product.status,
            created_at: now,
            updated_at: now,
        };
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update(&self, id: ProductId, fields: NewProduct) -> Result<Option<Product>> {
        let mut state = self.state.write().await;
        let Some(product) = state.products.get_mut(&id) else {
            return Ok(None);
        };
        product.name = fields.name;
        product.description = fields.description;
        product.price = fields.price;
        product.category = fields.category;
        product.images = fields.images;
        product.status = fields.status;
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn find(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list(&self, query: &ListQuery) -> Result<ProductPage> {
        let state = self.state.read().await;
        let mut matches: Vec<Product> = state
            .products
            .values()
            .filter(|p| p.status.is_active())
            .filter(|p| query.category.as_ref().is_none_or(|c| &p.category == c))
            .cloned()
            .collect();
        matches.sort_by(|a, b| match query.order {
            SortOrder::Asc => compare(a, b, query.sort_by),
            SortOrder::Desc => compare(b, a, query.sort_by),
        });
        Ok(page_of(matches, query.page, query.page_size, query.offset()))
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProductPage> {
        let keyword = query.keyword.to_lowercase();
        let state = self.state.read().await;
        let mut matches: Vec<Product> = state
            .products
            .values()
            .filter(|p| p.status.is_active())
            .filter(|p| {
                p.name.to_lowercase().contains(&keyword)
                    || p.description.to_lowercase().contains(&keyword)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| compare(b, a, SortField::Sales));
        Ok(page_of(matches, query.page, query.page_size, query.offset()))
    }

    async fn batch_update_stock(&self, deltas: &[StockDelta]) -> Result<Vec<StockLevel>> {
        let mut state = self.state.write().await;

        // Validate the whole batch against a scratch copy before touching state.
        let mut scratch: HashMap<ProductId, i64> = HashMap::new();
        let mut levels = Vec::with_capacity(deltas.len());
        for delta in deltas {
            let product = state
                .products
                .get(&delta.product_id)
                .filter(|p| p.status.is_active())
                .ok_or(CatalogError::InsufficientStock {
                    product_id: delta.product_id,
                    delta: delta.delta,
                })?;
            let current = scratch.get(&delta.product_id).copied().unwrap_or(product.stock);
            let next = current + delta.delta;
            if next < 0 {
                return Err(CatalogError::InsufficientStock {
                    product_id: delta.product_id,
                    delta: delta.delta,
                });
            }
            scratch.insert(delta.product_id, next);
            levels.push(StockLevel {
                product_id: delta.product_id,
                stock: next,
                category: product.category.clone(),
            });
        }

        let now = Utc::now();
        for (id, stock) in scratch {
            if let Some(product) = state.products.get_mut(&id) {
                product.stock = stock;
                product.updated_at = now;
            }
        }
        Ok(levels)
    }

    async fn update_stock(&self, delta: StockDelta) -> Result<StockLevel> {
        let mut levels = self.batch_update_stock(&[delta]).await?;
        levels.pop().ok_or(CatalogError::InsufficientStock {
            product_id: delta.product_id,
            delta: delta.delta,
        })
    }

    async fn stock_levels(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, i64>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id))
            .filter(|p| p.status.is_active())
            .map(|p| (p.id, p.stock))
            .collect())
    }

    async fn increment_sales(&self, id: ProductId, quantity: i64) -> Result<Option<SalesLevel>> {
        let mut state = self.state.write().await;
        let Some(product) = state.products.get_mut(&id).filter(|p| p.status.is_active()) else {
            return Ok(None);
        };
        product.sales += quantity;
        product.updated_at = Utc::now();
        Ok(Some(SalesLevel {
            product_id: id,
            sales: product.sales,
            category: product.category.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use common::Money;
    use domain::ProductStatus;

    use super::*;

    fn new_product(name: &str, cents: i64, stock: i64, category: &str) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: format!("{name} description"),
            price: Money::from_cents(cents),
            stock,
            category: category.to_string(),
            images: vec![],
            status: ProductStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let store = InMemoryProductStore::new();
        let p1 = store.insert(new_product("A", 100, 3, "c")).await.unwrap();
        let p2 = store.insert(new_product("B", 100, 50, "c")).await.unwrap();

        let result = store
            .batch_update_stock(&[
                StockDelta::new(p2.id, -10),
                StockDelta::new(p1.id, -5),
            ])
            .await;

        assert!(matches!(
            result,
            Err(CatalogError::InsufficientStock { product_id, .. }) if product_id == p1.id
        ));
        assert_eq!(store.stock_of(p1.id).await, Some(3));
        assert_eq!(store.stock_of(p2.id).await, Some(50));
    }

    #[tokio::test]
    async fn test_batch_applies_repeated_product_cumulatively() {
        let store = InMemoryProductStore::new();
        let p = store.insert(new_product("A", 100, 5, "c")).await.unwrap();

        let result = store
            .batch_update_stock(&[StockDelta::new(p.id, -3), StockDelta::new(p.id, -3)])
            .await;
        assert!(result.is_err());
        assert_eq!(store.stock_of(p.id).await, Some(5));

        let levels = store
            .batch_update_stock(&[StockDelta::new(p.id, -2), StockDelta::new(p.id, -3)])
            .await
            .unwrap();
        assert_eq!(levels[1].stock, 0);
        assert_eq!(store.stock_of(p.id).await, Some(0));
    }

    #[tokio::test]
    async fn test_inactive_product_refuses_stock_changes() {
        let store = InMemoryProductStore::new();
        let mut fields = new_product("A", 100, 5, "c");
        fields.status = ProductStatus::Inactive;
        let p = store.insert(fields).await.unwrap();

        assert!(store.update_stock(StockDelta::new(p.id, 1)).await.is_err());
        assert!(store.stock_levels(&[p.id]).await.unwrap().is_empty());
        assert!(store.increment_sales(p.id, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_stock_and_sales() {
        let store = InMemoryProductStore::new();
        let p = store.insert(new_product("A", 100, 5, "old")).await.unwrap();
        store.increment_sales(p.id, 2).await.unwrap();

        let updated = store
            .update(p.id, new_product("A2", 200, 999, "new"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.stock, 5);
        assert_eq!(updated.sales, 2);
        assert_eq!(updated.category, "new");
        assert!(store
            .update(ProductId::new(99), new_product("X", 1, 0, "c"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_pages() {
        let store = InMemoryProductStore::new();
        store.insert(new_product("A", 300, 1, "toys")).await.unwrap();
        store.insert(new_product("B", 100, 1, "toys")).await.unwrap();
        store.insert(new_product("C", 200, 1, "books")).await.unwrap();
        store.insert(new_product("D", 50, 1, "toys")).await.unwrap();

        let page = store
            .list(
                &ListQuery {
                    page: 1,
                    page_size: 2,
                    category: Some("toys".to_string()),
                    sort_by: SortField::Price,
                    order: SortOrder::Asc,
                }
                .normalized(),
            )
            .await
            .unwrap();

        assert_eq!(page.total, 3);
        let names: Vec<_> = page.products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["D", "B"]);
    }

    #[tokio::test]
    async fn test_search_orders_by_sales() {
        let store = InMemoryProductStore::new();
        let lamp = store.insert(new_product("Desk Lamp", 100, 1, "home")).await.unwrap();
        let lamp2 = store.insert(new_product("Floor lamp", 100, 1, "home")).await.unwrap();
        store.insert(new_product("Chair", 100, 1, "home")).await.unwrap();
        store.increment_sales(lamp2.id, 10).await.unwrap();
        store.increment_sales(lamp.id, 1).await.unwrap();

        let page = store
            .search(
                &SearchQuery {
                    keyword: "LAMP".to_string(),
                    ..Default::default()
                }
                .normalized(),
            )
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.products[0].id, lamp2.id);
    }
}
