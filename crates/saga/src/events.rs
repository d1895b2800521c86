//! Payloads of the events the order service publishes.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use domain::{Order, OrderStatus, StockDelta};
use serde::{Deserialize, Serialize};

/// A purchased line as carried in order events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineEvent {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

/// A stock movement as carried in the dead-letter event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLineEvent {
    pub product_id: ProductId,
    /// Units that should go back into stock (always positive).
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_no: String,
    pub user_id: UserId,
    pub total_amount: Money,
    pub items: Vec<OrderLineEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub order_no: String,
    pub user_id: UserId,
    pub total_amount: Money,
    pub items: Vec<OrderLineEvent>,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub order_no: String,
    pub user_id: UserId,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub operated_at: DateTime<Utc>,
}

/// Dead-letter payload for stock that could not be handed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCompensationFailed {
    pub order_no: String,
    pub user_id: UserId,
    pub items: Vec<StockLineEvent>,
    pub original_error: String,
    pub compensation_error: String,
    pub retry_count: u32,
    pub max_retries: u32,
}

fn lines(order: &Order) -> Vec<OrderLineEvent> {
    order
        .items
        .iter()
        .map(|item| OrderLineEvent {
            product_id: item.product_id,
            quantity: item.quantity,
            price: item.price,
        })
        .collect()
}

impl OrderCreated {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_no: order.order_no.clone(),
            user_id: order.user_id,
            total_amount: order.total_amount,
            items: lines(order),
        }
    }
}

impl OrderCancelled {
    pub fn from_order(order: &Order, cancelled_at: DateTime<Utc>) -> Self {
        Self {
            order_id: order.id,
            order_no: order.order_no.clone(),
            user_id: order.user_id,
            total_amount: order.total_amount,
            items: lines(order),
            cancelled_at,
        }
    }
}

impl StockLineEvent {
    /// Converts restoration deltas into event lines.
    pub fn from_restoration(deltas: &[StockDelta]) -> Vec<Self> {
        deltas
            .iter()
            .map(|d| StockLineEvent {
                product_id: d.product_id,
                quantity: d.delta.abs(),
            })
            .collect()
    }
}
