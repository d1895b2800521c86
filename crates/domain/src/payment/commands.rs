//! Payment commands.

use common::{Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::PaymentType;
use crate::error::DomainError;

/// Command to open a payment for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePayment {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub payment_type: PaymentType,
}

impl CreatePayment {
    /// Creates a new CreatePayment command.
    pub fn new(order_id: OrderId, user_id: UserId, amount: Money, payment_type: PaymentType) -> Self {
        Self {
            order_id,
            user_id,
            amount,
            payment_type,
        }
    }

    /// Rejects missing ids and non-positive amounts.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.order_id.is_valid() {
            return Err(DomainError::validation("order_id must be positive"));
        }
        if !self.user_id.is_valid() {
            return Err(DomainError::validation("user_id must be positive"));
        }
        if !self.amount.is_positive() {
            return Err(DomainError::validation("amount must be greater than 0"));
        }
        Ok(())
    }
}

/// Notification from the payment gateway.
///
/// `status` carries the gateway's numeric code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub payment_no: String,
    pub order_id: OrderId,
    pub status: i32,
    pub amount: Money,
    #[serde(default)]
    pub trade_no: String,
}

impl PaymentCallback {
    /// Creates a new PaymentCallback.
    pub fn new(
        payment_no: impl Into<String>,
        order_id: OrderId,
        status: i32,
        amount: Money,
        trade_no: impl Into<String>,
    ) -> Self {
        Self {
            payment_no: payment_no.into(),
            order_id,
            status,
            amount,
            trade_no: trade_no.into(),
        }
    }

    /// Rejects callbacks without a payment number.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.payment_no.trim().is_empty() {
            return Err(DomainError::validation("payment_no is required"));
        }
        Ok(())
    }
}
