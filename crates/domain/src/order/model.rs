//! Order and order item records.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::error::DomainError;
use crate::product::StockDelta;

/// A line of an order with the product snapshot taken at creation time.
///
/// Name, price and image are copies; later catalog edits never reach them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_name: String,
    pub product_image: String,
    pub price: Money,
    pub quantity: u32,
}

impl OrderItem {
    /// Returns price × quantity, or `None` if it does not fit in cents.
    pub fn subtotal(&self) -> Option<Money> {
        self.price.checked_mul(self.quantity)
    }
}

/// An order about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub order_no: String,
    pub total_amount: Money,
    pub address: String,
    pub phone: String,
    pub remark: String,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Builds a pending order whose total is the sum of the item snapshots.
    ///
    /// Fails when a line subtotal or the total overflows.
    pub fn new(
        user_id: UserId,
        order_no: impl Into<String>,
        items: Vec<OrderItem>,
        address: impl Into<String>,
        phone: impl Into<String>,
        remark: impl Into<String>,
    ) -> Result<Self, DomainError> {
        let total_amount = items
            .iter()
            .map(OrderItem::subtotal)
            .try_fold(Money::zero(), |total, subtotal| {
                subtotal.and_then(|s| total.checked_add(s))
            })
            .ok_or_else(|| DomainError::validation("order total is out of range"))?;
        Ok(Self {
            user_id,
            order_no: order_no.into(),
            total_amount,
            address: address.into(),
            phone: phone.into(),
            remark: remark.into(),
            items,
            created_at: Utc::now(),
        })
    }

    /// Turns the draft into a stored order once an id has been assigned.
    pub fn into_order(self, id: OrderId) -> Order {
        Order {
            id,
            user_id: self.user_id,
            order_no: self.order_no,
            total_amount: self.total_amount,
            status: OrderStatus::Pending,
            address: self.address,
            phone: self.phone,
            remark: self.remark,
            items: self.items,
            created_at: self.created_at,
            updated_at: self.created_at,
            paid_at: None,
            shipped_at: None,
            completed_at: None,
        }
    }

    /// Negative deltas that take this order's quantities out of stock.
    pub fn deduction(&self) -> Vec<StockDelta> {
        deltas(&self.items, -1)
    }
}

/// A persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub order_no: String,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub address: String,
    pub phone: String,
    pub remark: String,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Returns true if the order belongs to `user_id`.
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Positive deltas that put this order's quantities back into stock.
    pub fn restoration(&self) -> Vec<StockDelta> {
        deltas(&self.items, 1)
    }

    /// Applies a status change and stamps the matching timestamp.
    ///
    /// Does not consult the transition table; callers check it first.
    pub fn apply_status(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
        match status {
            OrderStatus::Paid => self.paid_at = Some(at),
            OrderStatus::Shipped => self.shipped_at = Some(at),
            OrderStatus::Completed => self.completed_at = Some(at),
            OrderStatus::Pending | OrderStatus::Cancelled => {}
        }
    }
}

fn deltas(items: &[OrderItem], sign: i64) -> Vec<StockDelta> {
    items
        .iter()
        .map(|item| StockDelta::new(item.product_id, sign * i64::from(item.quantity)))
        .collect()
}
