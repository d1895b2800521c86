use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use domain::{DomainError, MAX_LINE_QUANTITY, NewOrder, Order, OrderItem, OrderStatus, StockDelta};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::error::{Result, SagaError};
use crate::outbox::{IntentState, StockIntent, StockIntentStore};
use crate::store::{OrderPage, OrderQuery, OrderStore, OrderTx};

const ORDER_COLUMNS: &str = "id, user_id, order_no, total_amount, status, address, phone, remark, created_at, updated_at, paid_at, shipped_at, completed_at";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Loads the items of the given orders, grouped by order id.
    async fn items_of(&self, ids: &[i64]) -> Result<HashMap<OrderId, Vec<OrderItem>>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, product_id, product_name, product_image, price, quantity
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            let order_id = OrderId::new(row.try_get("order_id")?);
            items.entry(order_id).or_default().push(row_to_item(&row)?);
        }
        Ok(items)
    }

    async fn with_items(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<i64, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut items = self.items_of(&ids).await?;
        rows.iter()
            .map(|row| {
                let mut order = row_to_order(row)?;
                order.items = items.remove(&order.id).unwrap_or_default();
                Ok(order)
            })
            .collect()
    }
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        order_no: row.try_get("order_no")?,
        total_amount: Money::from_cents(row.try_get("total_amount")?),
        status: status.parse()?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
        remark: row.try_get("remark")?,
        items: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        paid_at: row.try_get("paid_at")?,
        shipped_at: row.try_get("shipped_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    let stored: i32 = row.try_get("quantity")?;
    let quantity = u32::try_from(stored)
        .map_err(|_| SagaError::Store(format!("order item quantity out of range: {stored}")))?;
    Ok(OrderItem {
        product_id: ProductId::new(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        product_image: row.try_get("product_image")?,
        price: Money::from_cents(row.try_get("price")?),
        quantity,
    })
}

/// A PostgreSQL transaction inserting one order.
pub struct PostgresOrderTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderTx for PostgresOrderTx {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orders (user_id, order_no, total_amount, status, address, phone, remark, created_at, updated_at)
            VALUES ($1, $2, $3, 'pending', $4, $5, $6, $7, $7)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.user_id.get())
        .bind(&order.order_no)
        .bind(order.total_amount.cents())
        .bind(&order.address)
        .bind(&order.phone)
        .bind(&order.remark)
        .bind(order.created_at)
        .fetch_one(&mut *self.tx)
        .await?;
        let mut stored = row_to_order(&row)?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, product_id, product_name, product_image, price, quantity)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(stored.id.get())
            .bind(item.product_id.get())
            .bind(&item.product_name)
            .bind(&item.product_image)
            .bind(item.price.cents())
            .bind(i32::try_from(item.quantity).map_err(|_| {
                DomainError::validation(format!(
                    "quantity for product {} cannot exceed {MAX_LINE_QUANTITY}",
                    item.product_id
                ))
            })?)
            .execute(&mut *self.tx)
            .await?;
        }

        stored.items = order.items.clone();
        Ok(stored)
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    type Tx = PostgresOrderTx;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(PostgresOrderTx {
            tx: self.pool.begin().await?,
        })
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_by_no(&self, order_no: &str) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_no = $1"
        ))
        .bind(order_no)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_by_user(&self, query: &OrderQuery) -> Result<OrderPage> {
        let status = query.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)",
        )
        .bind(query.user_id.get())
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(query.user_id.get())
        .bind(status)
        .bind(i64::from(query.page_size))
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(OrderPage {
            total,
            page: query.page,
            page_size: query.page_size,
            orders: self.with_items(rows).await?,
        })
    }

    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        // The WHERE clause on the current status makes concurrent writers
        // race on the row lock; only the first one matches.
        let row = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = $3,
                updated_at = $4,
                paid_at = CASE WHEN $3::TEXT = 'paid' THEN $4 ELSE paid_at END,
                shipped_at = CASE WHEN $3::TEXT = 'shipped' THEN $4 ELSE shipped_at END,
                completed_at = CASE WHEN $3::TEXT = 'completed' THEN $4 ELSE completed_at END
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

/// PostgreSQL-backed stock-intent store.
#[derive(Clone)]
pub struct PostgresIntentStore {
    pool: PgPool,
}

impl PostgresIntentStore {
    /// Creates a new PostgreSQL stock-intent store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_intent(row: &PgRow) -> Result<StockIntent> {
        let state: String = row.try_get("state")?;
        let deltas: Json<Vec<StockDelta>> = row.try_get("deltas")?;
        let stored: i32 = row.try_get("retry_count")?;
        let retry_count = u32::try_from(stored)
            .map_err(|_| SagaError::Store(format!("intent retry count out of range: {stored}")))?;
        Ok(StockIntent {
            order_no: row.try_get("order_no")?,
            user_id: UserId::new(row.try_get("user_id")?),
            deltas: deltas.0,
            state: state.parse::<IntentState>()?,
            retry_count,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl StockIntentStore for PostgresIntentStore {
    async fn save(&self, intent: &StockIntent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_intents (order_no, user_id, deltas, state, retry_count, last_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_no) DO UPDATE
            SET state = EXCLUDED.state,
                retry_count = EXCLUDED.retry_count,
                last_error = EXCLUDED.last_error,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&intent.order_no)
        .bind(intent.user_id.get())
        .bind(Json(&intent.deltas))
        .bind(intent.state.as_str())
        .bind(i32::try_from(intent.retry_count).map_err(|_| {
            SagaError::Store(format!("intent retry count out of range: {}", intent.retry_count))
        })?)
        .bind(intent.last_error.as_deref())
        .bind(intent.created_at)
        .bind(intent.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, order_no: &str) -> Result<Option<StockIntent>> {
        let row = sqlx::query("SELECT * FROM stock_intents WHERE order_no = $1")
            .bind(order_no)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_intent).transpose()
    }

    async fn list(
        &self,
        state: IntentState,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<StockIntent>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM stock_intents
            WHERE state = $1 AND updated_at < $2
            ORDER BY updated_at
            LIMIT $3
            "#,
        )
        .bind(state.as_str())
        .bind(updated_before)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_intent).collect()
    }
}
