//! The order service as seen by payments.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, OrderId, UserId};
use domain::{Order, OrderStatus, UpdateOrderStatus};
use saga::{CartClient, OrderService, OrderStore, ProductClient, SagaError, StockIntentStore};

use crate::error::{PaymentError, Result};

/// What payments need to know about an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSummary {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            total_amount: order.total_amount,
        }
    }
}

/// Order operations the payment service calls.
#[async_trait]
pub trait OrderClient: Send + Sync {
    /// Returns an order owned by `user_id`.
    async fn get_order(&self, order_id: OrderId, user_id: UserId) -> Result<OrderSummary>;

    /// Moves an order forward.
    async fn update_order_status(&self, cmd: UpdateOrderStatus) -> Result<()>;
}

#[async_trait]
impl<T: OrderClient + ?Sized> OrderClient for Arc<T> {
    async fn get_order(&self, order_id: OrderId, user_id: UserId) -> Result<OrderSummary> {
        (**self).get_order(order_id, user_id).await
    }

    async fn update_order_status(&self, cmd: UpdateOrderStatus) -> Result<()> {
        (**self).update_order_status(cmd).await
    }
}

fn from_saga(error: SagaError) -> PaymentError {
    match error {
        SagaError::OrderNotFound(id) => PaymentError::OrderNotFound(id),
        other => PaymentError::OrderService(other.to_string()),
    }
}

#[async_trait]
impl<O, I, P, C> OrderClient for OrderService<O, I, P, C>
where
    O: OrderStore,
    I: StockIntentStore,
    P: ProductClient,
    C: CartClient + 'static,
{
    async fn get_order(&self, order_id: OrderId, user_id: UserId) -> Result<OrderSummary> {
        let order = OrderService::get_order(self, order_id, user_id)
            .await
            .map_err(from_saga)?;
        Ok(OrderSummary::from(&order))
    }

    async fn update_order_status(&self, cmd: UpdateOrderStatus) -> Result<()> {
        OrderService::update_order_status(self, cmd)
            .await
            .map(|_| ())
            .map_err(from_saga)
    }
}

#[derive(Debug, Default)]
struct OrderRecords {
    orders: HashMap<OrderId, OrderSummary>,
    status_updates: Vec<UpdateOrderStatus>,
    fail_on_update: bool,
}

/// In-memory order client for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderClient {
    state: Arc<RwLock<OrderRecords>>,
}

impl InMemoryOrderClient {
    /// Creates a client with no orders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an order with the given total in cents.
    pub fn add_order(&self, id: i64, user_id: UserId, total_cents: i64, status: OrderStatus) -> OrderId {
        let id = OrderId::new(id);
        self.state.write().unwrap().orders.insert(
            id,
            OrderSummary {
                id,
                user_id,
                status,
                total_amount: Money::from_cents(total_cents),
            },
        );
        id
    }

    /// Returns the current status of an order.
    pub fn status_of(&self, id: OrderId) -> Option<OrderStatus> {
        self.state.read().unwrap().orders.get(&id).map(|o| o.status)
    }

    /// Returns every status update received, including failed ones.
    pub fn status_updates(&self) -> Vec<UpdateOrderStatus> {
        self.state.read().unwrap().status_updates.clone()
    }

    /// Makes status updates fail.
    pub fn set_fail_on_update(&self, fail: bool) {
        self.state.write().unwrap().fail_on_update = fail;
    }
}

#[async_trait]
impl OrderClient for InMemoryOrderClient {
    async fn get_order(&self, order_id: OrderId, user_id: UserId) -> Result<OrderSummary> {
        self.state
            .read()
            .unwrap()
            .orders
            .get(&order_id)
            .filter(|o| o.user_id == user_id)
            .copied()
            .ok_or(PaymentError::OrderNotFound(order_id))
    }

    async fn update_order_status(&self, cmd: UpdateOrderStatus) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.status_updates.push(cmd);
        if state.fail_on_update {
            return Err(PaymentError::OrderService("order service unavailable".to_string()));
        }
        let order = state
            .orders
            .get_mut(&cmd.order_id)
            .ok_or(PaymentError::OrderNotFound(cmd.order_id))?;
        order.status.ensure_transition(cmd.status)?;
        order.status = cmd.status;
        Ok(())
    }
}
