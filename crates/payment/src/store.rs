use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use domain::{NewPayment, Payment, PaymentStatus};

use crate::error::Result;

/// Storage for payments.
///
/// An order has at most one payment that is not cancelled.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a pending payment unless the order already has a live one.
    ///
    /// Returns `None` when another payment for the order exists.
    async fn insert_if_absent(&self, payment: &NewPayment) -> Result<Option<Payment>>;

    /// Returns a payment by id.
    async fn find(&self, id: PaymentId) -> Result<Option<Payment>>;

    /// Returns a payment by its business number.
    async fn find_by_no(&self, payment_no: &str) -> Result<Option<Payment>>;

    /// Returns the order's payment that is not cancelled.
    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Payment>>;

    /// Resolves a pending payment to `status`.
    ///
    /// Only writes while the stored status is still pending; returns `None`
    /// when another callback resolved it first.
    async fn resolve(
        &self,
        payment_no: &str,
        status: PaymentStatus,
        trade_no: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>>;

    /// Cancels a pending payment; returns `None` if it was no longer pending.
    async fn cancel(&self, id: PaymentId, at: DateTime<Utc>) -> Result<Option<Payment>>;
}

#[async_trait]
impl<T: PaymentStore + ?Sized> PaymentStore for Arc<T> {
    async fn insert_if_absent(&self, payment: &NewPayment) -> Result<Option<Payment>> {
        (**self).insert_if_absent(payment).await
    }

    async fn find(&self, id: PaymentId) -> Result<Option<Payment>> {
        (**self).find(id).await
    }

    async fn find_by_no(&self, payment_no: &str) -> Result<Option<Payment>> {
        (**self).find_by_no(payment_no).await
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        (**self).find_by_order(order_id).await
    }

    async fn resolve(
        &self,
        payment_no: &str,
        status: PaymentStatus,
        trade_no: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        (**self).resolve(payment_no, status, trade_no, at).await
    }

    async fn cancel(&self, id: PaymentId, at: DateTime<Utc>) -> Result<Option<Payment>> {
        (**self).cancel(id, at).await
    }
}
