//! Payloads of the events the payment service publishes.

use common::{Money, OrderId, PaymentId, UserId};
use domain::{Payment, PaymentStatus, PaymentType};
use serde::{Deserialize, Serialize};

/// Body of `payment.success` and `payment.failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResolved {
    pub payment_id: PaymentId,
    pub payment_no: String,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PaymentResolved {
    pub fn from_payment(payment: &Payment) -> Self {
        let failed = payment.status == PaymentStatus::Failed;
        Self {
            payment_id: payment.id,
            payment_no: payment.payment_no.clone(),
            order_id: payment.order_id,
            user_id: payment.user_id,
            amount: payment.amount,
            payment_type: payment.payment_type,
            status: payment.status,
            trade_no: payment.trade_no.clone(),
            reason: failed.then(|| "payment failed".to_string()),
        }
    }
}
