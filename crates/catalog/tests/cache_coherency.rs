//! A list read that starts after a stock mutation returned never sees the
//! pre-mutation stock.

use catalog::cache::keys;
use catalog::{
    CacheBackend, InMemoryCache, InMemoryProductStore, ListQuery, ProductService, SearchQuery,
};
use common::Money;
use domain::{NewProduct, ProductStatus, StockDelta};

fn product(name: &str, stock: i64, category: &str) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        description: String::new(),
        price: Money::from_cents(999),
        stock,
        category: category.to_string(),
        images: Vec::new(),
        status: ProductStatus::Active,
    }
}

fn in_category(category: &str) -> ListQuery {
    ListQuery {
        category: Some(category.to_string()),
        ..ListQuery::default()
    }
}

#[tokio::test]
async fn test_category_list_sees_stock_change() {
    let cache = InMemoryCache::new();
    let service = ProductService::new(InMemoryProductStore::new(), cache.clone());
    let lamp = service.add_product(product("Lamp", 9, "home")).await.unwrap();

    let before = service.list_products(in_category("home")).await.unwrap();
    assert_eq!(before.products[0].stock, 9);

    service
        .batch_update_stock(&[StockDelta::new(lamp.id, -4)])
        .await
        .unwrap();

    let after = service.list_products(in_category("home")).await.unwrap();
    assert_eq!(after.products[0].stock, 5);
}

#[tokio::test]
async fn test_unfiltered_list_and_search_see_stock_change() {
    let service = ProductService::new(InMemoryProductStore::new(), InMemoryCache::new());
    let lamp = service.add_product(product("Lamp", 9, "home")).await.unwrap();

    let search = SearchQuery {
        keyword: "lamp".to_string(),
        ..SearchQuery::default()
    };
    service.list_products(ListQuery::default()).await.unwrap();
    service.search_products(search.clone()).await.unwrap();

    service
        .update_stock(StockDelta::new(lamp.id, -9))
        .await
        .unwrap();

    let listed = service.list_products(ListQuery::default()).await.unwrap();
    assert_eq!(listed.products[0].stock, 0);
    let found = service.search_products(search).await.unwrap();
    assert_eq!(found.products[0].stock, 0);
}

#[tokio::test]
async fn test_mutation_bumps_only_touched_categories() {
    let cache = InMemoryCache::new();
    let service = ProductService::new(InMemoryProductStore::new(), cache.clone());
    let lamp = service.add_product(product("Lamp", 9, "home")).await.unwrap();
    service.add_product(product("Ball", 3, "toys")).await.unwrap();

    service.list_products(in_category("toys")).await.unwrap();
    service.list_products(in_category("home")).await.unwrap();
    let toys_version = cache.get(&keys::category_version("toys")).await.unwrap();
    let home_version = cache.get(&keys::category_version("home")).await.unwrap();

    service
        .batch_update_stock(&[StockDelta::new(lamp.id, -1)])
        .await
        .unwrap();

    assert_eq!(
        cache.get(&keys::category_version("toys")).await.unwrap(),
        toys_version
    );
    assert_ne!(
        cache.get(&keys::category_version("home")).await.unwrap(),
        home_version
    );
}

#[tokio::test]
async fn test_repeated_list_is_served_from_cache() {
    let cache = InMemoryCache::new();
    let service = ProductService::new(InMemoryProductStore::new(), cache.clone());
    service.add_product(product("Lamp", 9, "home")).await.unwrap();

    service.list_products(in_category("home")).await.unwrap();
    let cached = cache.keys_with_prefix("product:list:").await;
    assert_eq!(cached.len(), 1);

    service.list_products(in_category("home")).await.unwrap();
    assert_eq!(cache.keys_with_prefix("product:list:").await, cached);
}

#[tokio::test]
async fn test_category_move_refreshes_both_lists() {
    let service = ProductService::new(InMemoryProductStore::new(), InMemoryCache::new());
    let lamp = service.add_product(product("Lamp", 9, "home")).await.unwrap();

    assert_eq!(service.list_products(in_category("home")).await.unwrap().total, 1);
    assert_eq!(service.list_products(in_category("garden")).await.unwrap().total, 0);

    service
        .update_product(lamp.id, product("Lamp", 0, "garden"))
        .await
        .unwrap();

    assert_eq!(service.list_products(in_category("home")).await.unwrap().total, 0);
    assert_eq!(service.list_products(in_category("garden")).await.unwrap().total, 1);
}
