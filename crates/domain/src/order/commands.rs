//! Order commands.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::OrderStatus;
use crate::error::DomainError;

/// Largest quantity a single order line may carry; stored quantities are
/// 32-bit signed integers.
pub const MAX_LINE_QUANTITY: u32 = i32::MAX as u32;

/// One requested line: which product and how many.
///
/// Clients never send prices; they are looked up from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl OrderLine {
    /// Creates a new order line.
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Command to place an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub user_id: UserId,
    pub items: Vec<OrderLine>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub remark: String,
}

impl CreateOrder {
    /// Creates a new CreateOrder command with empty contact fields.
    pub fn new(user_id: UserId, items: Vec<OrderLine>) -> Self {
        Self {
            user_id,
            items,
            address: String::new(),
            phone: String::new(),
            remark: String::new(),
        }
    }

    /// Sets the delivery address and phone.
    pub fn with_contact(mut self, address: impl Into<String>, phone: impl Into<String>) -> Self {
        self.address = address.into();
        self.phone = phone.into();
        self
    }

    /// Sets the remark.
    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = remark.into();
        self
    }

    /// Rejects commands that could never produce an order.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.user_id.is_valid() {
            return Err(DomainError::validation("user_id must be positive"));
        }
        if self.items.is_empty() {
            return Err(DomainError::validation("order items cannot be empty"));
        }
        for line in &self.items {
            if !line.product_id.is_valid() {
                return Err(DomainError::validation("product_id must be positive"));
            }
            if line.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "quantity for product {} must be greater than 0",
                    line.product_id
                )));
            }
            if line.quantity > MAX_LINE_QUANTITY {
                return Err(DomainError::validation(format!(
                    "quantity for product {} cannot exceed {MAX_LINE_QUANTITY}",
                    line.product_id
                )));
            }
        }
        Ok(())
    }
}

/// Command to move an order forward through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateOrderStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
    /// When the change happened; defaults to now.
    #[serde(default)]
    pub operated_at: Option<DateTime<Utc>>,
}

impl UpdateOrderStatus {
    /// Creates a new UpdateOrderStatus command stamped at call time.
    pub fn new(order_id: OrderId, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            operated_at: None,
        }
    }

    /// Sets an explicit operation time.
    pub fn at(mut self, operated_at: DateTime<Utc>) -> Self {
        self.operated_at = Some(operated_at);
        self
    }

    /// Restricts the target to paid, shipped or completed.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.order_id.is_valid() {
            return Err(DomainError::validation("order_id must be positive"));
        }
        if !self.status.is_update_target() {
            return Err(DomainError::validation(
                "invalid status (use CancelOrder for cancellation)",
            ));
        }
        Ok(())
    }
}
