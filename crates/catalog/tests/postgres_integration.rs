//! PostgreSQL integration tests for the product store.
//!
//! These tests share one PostgreSQL container and need Docker. Run with:
//!
//! ```bash
//! cargo test -p catalog --test postgres_integration -- --ignored --test-threads=1
//! ```

use std::sync::Arc;

use catalog::{CatalogError, ListQuery, PostgresProductStore, ProductStore, SearchQuery, SortField};
use common::{Money, ProductId};
use domain::{NewProduct, ProductStatus, StockDelta};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();
            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_products_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresProductStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE products RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresProductStore::new(pool)
}

fn product(name: &str, cents: i64, stock: i64, category: &str) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        description: format!("{name} for every day"),
        price: Money::from_cents(cents),
        stock,
        category: category.to_string(),
        images: vec![format!("{name}.png")],
        status: ProductStatus::Active,
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_insert_and_find() {
    let store = get_test_store().await;
    let created = store.insert(product("Mug", 1200, 8, "kitchen")).await.unwrap();

    let found = store.find(created.id).await.unwrap().unwrap();
    assert_eq!(found.name, "Mug");
    assert_eq!(found.images, vec!["Mug.png".to_string()]);
    assert_eq!(found.stock, 8);
    assert!(store.find(ProductId::new(9999)).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_batch_rolls_back_on_short_item() {
    let store = get_test_store().await;
    let p1 = store.insert(product("Mug", 1200, 3, "kitchen")).await.unwrap();
    let p2 = store.insert(product("Plate", 900, 50, "kitchen")).await.unwrap();

    let result = store
        .batch_update_stock(&[StockDelta::new(p2.id, -10), StockDelta::new(p1.id, -5)])
        .await;

    assert!(matches!(result, Err(CatalogError::InsufficientStock { .. })));
    assert_eq!(store.find(p1.id).await.unwrap().unwrap().stock, 3);
    assert_eq!(store.find(p2.id).await.unwrap().unwrap().stock, 50);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_deductions_never_oversell() {
    let store = get_test_store().await;
    let p1 = store.insert(product("Mug", 1200, 5, "kitchen")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .batch_update_stock(&[StockDelta::new(p1.id, -1)])
                .await
                .is_ok()
        }));
    }
    let results = futures_util::future::join_all(handles).await;
    let applied = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();

    assert_eq!(applied, 5);
    assert_eq!(store.find(p1.id).await.unwrap().unwrap().stock, 0);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_list_and_search() {
    let store = get_test_store().await;
    store.insert(product("Mug", 1200, 3, "kitchen")).await.unwrap();
    store.insert(product("Plate", 900, 3, "kitchen")).await.unwrap();
    store.insert(product("Ball", 500, 3, "toys")).await.unwrap();

    let page = store
        .list(&ListQuery {
            category: Some("kitchen".to_string()),
            sort_by: SortField::Price,
            ..ListQuery::default()
        }
        .normalized())
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    let found = store
        .search(
            &SearchQuery {
                keyword: "BALL".to_string(),
                ..SearchQuery::default()
            }
            .normalized(),
        )
        .await
        .unwrap();
    assert_eq!(found.total, 1);
    assert_eq!(found.products[0].name, "Ball");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_increment_sales_and_stock_levels() {
    let store = get_test_store().await;
    let p1 = store.insert(product("Mug", 1200, 3, "kitchen")).await.unwrap();

    let level = store.increment_sales(p1.id, 4).await.unwrap().unwrap();
    assert_eq!(level.sales, 4);
    assert_eq!(level.category, "kitchen");

    let levels = store
        .stock_levels(&[p1.id, ProductId::new(777)])
        .await
        .unwrap();
    assert_eq!(levels.get(&p1.id), Some(&3));
    assert!(!levels.contains_key(&ProductId::new(777)));
}
