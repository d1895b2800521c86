//! Stock ledger behavior through the product service.

use std::sync::Arc;

use catalog::{CatalogError, InMemoryCache, InMemoryProductStore, ProductService, ProductStore};
use common::{Money, ProductId};
use domain::{NewProduct, ProductStatus, StockDelta, StockRequirement};

type Service = ProductService<InMemoryProductStore, InMemoryCache>;

fn service() -> Service {
    ProductService::new(InMemoryProductStore::new(), InMemoryCache::new())
}

fn product(name: &str, stock: i64) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        description: format!("{name} description"),
        price: Money::from_cents(2500),
        stock,
        category: "kitchen".to_string(),
        images: vec![format!("{name}.png")],
        status: ProductStatus::Active,
    }
}

#[tokio::test]
async fn test_batch_with_one_short_item_changes_nothing() {
    let service = service();
    let p1 = service.add_product(product("Kettle", 3)).await.unwrap();
    let p2 = service.add_product(product("Toaster", 50)).await.unwrap();

    let result = service
        .batch_update_stock(&[StockDelta::new(p2.id, -1), StockDelta::new(p1.id, -5)])
        .await;

    match result {
        Err(CatalogError::InsufficientStock { product_id, .. }) => assert_eq!(product_id, p1.id),
        other => panic!("expected insufficient stock, got {other:?}"),
    }
    assert_eq!(service.store().stock_of(p1.id).await, Some(3));
    assert_eq!(service.store().stock_of(p2.id).await, Some(50));
}

#[tokio::test]
async fn test_batch_deduct_then_restore() {
    let service = service();
    let p1 = service.add_product(product("Kettle", 10)).await.unwrap();
    let p2 = service.add_product(product("Toaster", 4)).await.unwrap();

    let deduction = [StockDelta::new(p1.id, -2), StockDelta::new(p2.id, -4)];
    let levels = service.batch_update_stock(&deduction).await.unwrap();
    assert_eq!(levels[0].stock, 8);
    assert_eq!(levels[1].stock, 0);

    let restoration: Vec<StockDelta> = deduction.iter().map(StockDelta::inverse).collect();
    service.batch_update_stock(&restoration).await.unwrap();
    assert_eq!(service.store().stock_of(p1.id).await, Some(10));
    assert_eq!(service.store().stock_of(p2.id).await, Some(4));
}

#[tokio::test]
async fn test_unknown_product_rejects_whole_batch() {
    let service = service();
    let p1 = service.add_product(product("Kettle", 10)).await.unwrap();

    let result = service
        .batch_update_stock(&[StockDelta::new(p1.id, -1), StockDelta::new(ProductId::new(999), -1)])
        .await;

    assert!(matches!(result, Err(CatalogError::InsufficientStock { .. })));
    assert_eq!(service.store().stock_of(p1.id).await, Some(10));
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let service = service();
    assert!(matches!(
        service.batch_update_stock(&[]).await,
        Err(CatalogError::Validation(_))
    ));
}

#[tokio::test]
async fn test_concurrent_deductions_never_oversell() {
    let service = Arc::new(service());
    let p1 = service.add_product(product("Kettle", 10)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..40 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service
                .batch_update_stock(&[StockDelta::new(p1.id, -1)])
                .await
                .is_ok()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap() {
            applied += 1;
        }
    }

    assert_eq!(applied, 10);
    assert_eq!(service.store().stock_of(p1.id).await, Some(0));
}

#[tokio::test]
async fn test_check_stock_is_advisory() {
    let service = service();
    let p1 = service.add_product(product("Kettle", 3)).await.unwrap();

    let check = service
        .check_stock(&[
            StockRequirement::new(p1.id, 2),
            StockRequirement::new(ProductId::new(404), 1),
        ])
        .await
        .unwrap();

    assert!(!check.available);
    assert!(check.items[0].available);
    assert_eq!(check.items[0].available_stock, 3);
    assert!(!check.items[1].available);
    assert_eq!(check.items[1].available_stock, 0);

    // Nothing was reserved.
    assert_eq!(service.store().stock_of(p1.id).await, Some(3));
}

#[tokio::test]
async fn test_update_product_keeps_stock_and_sales() {
    let service = service();
    let p1 = service.add_product(product("Kettle", 7)).await.unwrap();
    service.increment_sales(p1.id, 2).await.unwrap();

    let mut edit = product("Kettle Pro", 0);
    edit.category = "appliances".to_string();
    let updated = service.update_product(p1.id, edit).await.unwrap();

    assert_eq!(updated.name, "Kettle Pro");
    assert_eq!(updated.category, "appliances");
    assert_eq!(updated.stock, 7);
    assert_eq!(updated.sales, 2);
}

#[tokio::test]
async fn test_single_update_is_guarded() {
    let service = service();
    let p1 = service.add_product(product("Kettle", 1)).await.unwrap();

    assert!(matches!(
        service.update_stock(StockDelta::new(p1.id, -2)).await,
        Err(CatalogError::InsufficientStock { .. })
    ));
    let level = service
        .update_stock(StockDelta::new(p1.id, 5))
        .await
        .unwrap();
    assert_eq!(level.stock, 6);
    assert_eq!(level.category, "kitchen");
}
