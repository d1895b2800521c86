//! Payment records.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId, UserId};
use serde::{Deserialize, Serialize};

use super::{PaymentStatus, PaymentType};

/// A payment about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_no: String,
    pub amount: Money,
    pub payment_type: PaymentType,
    pub created_at: DateTime<Utc>,
}

impl NewPayment {
    /// Turns the draft into a stored, pending payment.
    pub fn into_payment(self, id: PaymentId) -> Payment {
        Payment {
            id,
            order_id: self.order_id,
            user_id: self.user_id,
            payment_no: self.payment_no,
            amount: self.amount,
            payment_type: self.payment_type,
            status: PaymentStatus::Pending,
            trade_no: None,
            paid_at: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// A persisted payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_no: String,
    pub amount: Money,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub trade_no: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Records the gateway's verdict.
    ///
    /// The trade number and paid-at time are kept only for successful
    /// payments.
    pub fn resolve(&mut self, status: PaymentStatus, trade_no: &str, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
        if status == PaymentStatus::Success {
            self.trade_no = Some(trade_no.to_string());
            self.paid_at = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> Payment {
        NewPayment {
            order_id: OrderId::new(1),
            user_id: UserId::new(2),
            payment_no: "PAY1".to_string(),
            amount: Money::from_cents(5000),
            payment_type: PaymentType::Alipay,
            created_at: Utc::now(),
        }
        .into_payment(PaymentId::new(3))
    }

    #[test]
    fn test_new_payment_is_pending() {
        let p = payment();
        assert_eq!(p.status, PaymentStatus::Pending);
        assert!(p.trade_no.is_none());
    }

    #[test]
    fn test_resolve_success_sets_trade_no() {
        let mut p = payment();
        let at = Utc::now();
        p.resolve(PaymentStatus::Success, "T-1", at);
        assert_eq!(p.trade_no.as_deref(), Some("T-1"));
        assert_eq!(p.paid_at, Some(at));
    }

    #[test]
    fn test_resolve_failure_leaves_trade_no_empty() {
        let mut p = payment();
        p.resolve(PaymentStatus::Failed, "T-2", Utc::now());
        assert_eq!(p.status, PaymentStatus::Failed);
        assert!(p.trade_no.is_none());
        assert!(p.paid_at.is_none());
    }
}
