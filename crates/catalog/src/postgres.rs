use std::collections::HashMap;

use async_trait::async_trait;
use common::{Money, ProductId};
use domain::{NewProduct, Product, StockDelta, StockLevel};
use sqlx::types::Json;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::error::{CatalogError, Result};
use crate::store::{ListQuery, ProductPage, ProductStore, SalesLevel, SearchQuery};

const PRODUCT_COLUMNS: &str = "id, name, description, price, stock, sales, category, images, status, created_at, updated_at";

/// PostgreSQL-backed product store.
#[derive(Clone)]
pub struct PostgresProductStore {
    pool: PgPool,
}

impl PostgresProductStore {
    /// Creates a new PostgreSQL product store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let status: String = row.try_get("status")?;
        let images: Json<Vec<String>> = row.try_get("images")?;
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            price: Money::from_cents(row.try_get("price")?),
            stock: row.try_get("stock")?,
            sales: row.try_get("sales")?,
            category: row.try_get("category")?,
            images: images.0,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl ProductStore for PostgresProductStore {
    async fn insert(&self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (name, description, price, stock, sales, category, images, status)
            VALUES ($1, $2, $3, $4, 0, $5, $6, $7)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(product.stock)
        .bind(&product.category)
        .bind(Json(&product.images))
        .bind(product.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(row)
    }

    async fn update(&self, id: ProductId, product: NewProduct) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET name = $1, description = $2, price = $3, category = $4, images = $5,
                status = $6, updated_at = NOW()
            WHERE id = $7
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.cents())
        .bind(&product.category)
        .bind(Json(&product.images))
        .bind(product.status.as_str())
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn find(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_product).transpose()
    }

    async fn list(&self, query: &ListQuery) -> Result<ProductPage> {
        // Sort column and direction come from closed enums, never from input.
        let order_by = format!(
            "{} {}, id {}",
            query.sort_by.as_str(),
            query.order.as_str(),
            query.order.as_str()
        );

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE status = 'active' AND ($1::TEXT IS NULL OR category = $1)",
        )
        .bind(query.category.as_deref())
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE status = 'active' AND ($1::TEXT IS NULL OR category = $1)
            ORDER BY {order_by}
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(query.category.as_deref())
        .bind(i64::from(query.page_size))
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(ProductPage {
            total,
            page: query.page,
            page_size: query.page_size,
            products: rows
                .into_iter()
                .map(Self::row_to_product)
                .collect::<Result<_>>()?,
        })
    }

    async fn search(&self, query: &SearchQuery) -> Result<ProductPage> {
        let pattern = like_pattern(&query.keyword);

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE status = 'active' AND (name ILIKE $1 OR description ILIKE $1)",
        )
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {PRODUCT_COLUMNS} FROM products
            WHERE status = 'active' AND (name ILIKE $1 OR description ILIKE $1)
            ORDER BY sales DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(&pattern)
        .bind(i64::from(query.page_size))
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(ProductPage {
            total,
            page: query.page,
            page_size: query.page_size,
            products: rows
                .into_iter()
                .map(Self::row_to_product)
                .collect::<Result<_>>()?,
        })
    }

    async fn batch_update_stock(&self, deltas: &[StockDelta]) -> Result<Vec<StockLevel>> {
        let mut tx = self.pool.begin().await?;
        let mut levels = Vec::with_capacity(deltas.len());

        for delta in deltas {
            let row = sqlx::query(
                r#"
                UPDATE products
                SET stock = stock + $1, updated_at = NOW()
                WHERE id = $2 AND status = 'active' AND stock + $1 >= 0
                RETURNING stock, category
                "#,
            )
            .bind(delta.delta)
            .bind(delta.product_id.get())
            .fetch_optional(&mut *tx)
            .await?;

            let Some(row) = row else {
                tx.rollback().await?;
                return Err(CatalogError::InsufficientStock {
                    product_id: delta.product_id,
                    delta: delta.delta,
                });
            };

            levels.push(StockLevel {
                product_id: delta.product_id,
                stock: row.try_get("stock")?,
                category: row.try_get("category")?,
            });
        }

        tx.commit().await?;
        Ok(levels)
    }

    async fn update_stock(&self, delta: StockDelta) -> Result<StockLevel> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + $1, updated_at = NOW()
            WHERE id = $2 AND status = 'active' AND stock + $1 >= 0
            RETURNING stock, category
            "#,
        )
        .bind(delta.delta)
        .bind(delta.product_id.get())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(CatalogError::InsufficientStock {
            product_id: delta.product_id,
            delta: delta.delta,
        })?;

        Ok(StockLevel {
            product_id: delta.product_id,
            stock: row.try_get("stock")?,
            category: row.try_get("category")?,
        })
    }

    async fn stock_levels(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, i64>> {
        let raw: Vec<i64> = ids.iter().map(ProductId::get).collect();
        let rows = sqlx::query("SELECT id, stock FROM products WHERE id = ANY($1) AND status = 'active'")
            .bind(&raw)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| -> Result<(ProductId, i64)> {
                Ok((ProductId::new(row.try_get("id")?), row.try_get("stock")?))
            })
            .collect()
    }

    async fn increment_sales(&self, id: ProductId, quantity: i64) -> Result<Option<SalesLevel>> {
        let row = sqlx::query(
            r#"
            UPDATE products
            SET sales = sales + $1, updated_at = NOW()
            WHERE id = $2 AND status = 'active'
            RETURNING sales, category
            "#,
        )
        .bind(quantity)
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<SalesLevel> {
            Ok(SalesLevel {
                product_id: id,
                sales: row.try_get("sales")?,
                category: row.try_get("category")?,
            })
        })
        .transpose()
    }
}
