use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{NewOrder, Order, OrderStatus};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A unit of work that inserts an order and its items atomically.
///
/// Dropping the transaction without committing discards the insert.
#[async_trait]
pub trait OrderTx: Send {
    /// Stages an order with its items and returns it with its assigned id.
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order>;

    /// Makes the staged order visible.
    async fn commit(self) -> Result<()>;

    /// Discards the staged order.
    async fn rollback(self) -> Result<()>;
}

/// Page request for a user's orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderQuery {
    pub user_id: UserId,
    pub page: u32,
    pub page_size: u32,
    pub status: Option<OrderStatus>,
}

impl OrderQuery {
    /// Creates the first page of a user's orders.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            page: 1,
            page_size: 10,
            status: None,
        }
    }

    /// Clamps the page to 1.. and the size to 1..=100 (0 means 10).
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.page_size = match self.page_size {
            0 => 10,
            n => n.min(100),
        };
        self
    }

    /// Returns the row offset of the page.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

/// One page of orders, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPage {
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub orders: Vec<Order>,
}

/// Storage for orders and their items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    type Tx: OrderTx;

    /// Opens a unit of work.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Returns an order with its items.
    async fn find(&self, id: OrderId) -> Result<Option<Order>>;

    /// Returns an order by its business number.
    async fn find_by_no(&self, order_no: &str) -> Result<Option<Order>>;

    /// Returns a page of a user's orders.
    async fn list_by_user(&self, query: &OrderQuery) -> Result<OrderPage>;

    /// Moves an order from `from` to `to`, stamping the status timestamp.
    ///
    /// The write only happens if the stored status is still `from`; returns
    /// `None` when another writer got there first.
    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    type Tx = T::Tx;

    async fn begin(&self) -> Result<Self::Tx> {
        (**self).begin().await
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>> {
        (**self).find(id).await
    }

    async fn find_by_no(&self, order_no: &str) -> Result<Option<Order>> {
        (**self).find_by_no(order_no).await
    }

    async fn list_by_user(&self, query: &OrderQuery) -> Result<OrderPage> {
        (**self).list_by_user(query).await
    }

    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        (**self).transition_status(id, from, to, at).await
    }
}
