//! In-memory payment store for testing.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, PaymentId};
use domain::{NewPayment, Payment, PaymentStatus};

use crate::error::{PaymentError, Result};
use crate::store::PaymentStore;

#[derive(Debug, Default)]
struct PaymentRecords {
    payments: BTreeMap<PaymentId, Payment>,
    next_id: i64,
    fail_on_write: bool,
}

/// In-memory payment store.
///
/// One write lock per call gives the same guarantees as the unique index and
/// the conditional updates of the database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentStore {
    state: Arc<RwLock<PaymentRecords>>,
}

impl InMemoryPaymentStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.state.write().unwrap().fail_on_write = fail;
    }

    /// Returns the number of stored payments, cancelled ones included.
    pub fn payment_count(&self) -> usize {
        self.state.read().unwrap().payments.len()
    }

    /// Returns a payment by number without going through the trait.
    pub fn get_by_no(&self, payment_no: &str) -> Option<Payment> {
        self.state
            .read()
            .unwrap()
            .payments
            .values()
            .find(|p| p.payment_no == payment_no)
            .cloned()
    }

    fn check_writable(records: &PaymentRecords) -> Result<()> {
        if records.fail_on_write {
            Err(PaymentError::Store("payment store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

fn live_for_order(records: &PaymentRecords, order_id: OrderId) -> Option<&Payment> {
    records
        .payments
        .values()
        .find(|p| p.order_id == order_id && p.status != PaymentStatus::Cancelled)
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert_if_absent(&self, payment: &NewPayment) -> Result<Option<Payment>> {
        let mut state = self.state.write().unwrap();
        Self::check_writable(&state)?;
        if live_for_order(&state, payment.order_id).is_some() {
            return Ok(None);
        }
        if state
            .payments
            .values()
            .any(|p| p.payment_no == payment.payment_no)
        {
            return Err(PaymentError::Store(format!(
                "duplicate payment number {}",
                payment.payment_no
            )));
        }
        state.next_id += 1;
        let stored = payment.clone().into_payment(PaymentId::new(state.next_id));
        state.payments.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    async fn find(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.state.read().unwrap().payments.get(&id).cloned())
    }

    async fn find_by_no(&self, payment_no: &str) -> Result<Option<Payment>> {
        Ok(self.get_by_no(payment_no))
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Option<Payment>> {
        Ok(live_for_order(&self.state.read().unwrap(), order_id).cloned())
    }

    async fn resolve(
        &self,
        payment_no: &str,
        status: PaymentStatus,
        trade_no: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        let mut state = self.state.write().unwrap();
        Self::check_writable(&state)?;
        let Some(payment) = state
            .payments
            .values_mut()
            .find(|p| p.payment_no == payment_no && p.status.is_pending())
        else {
            return Ok(None);
        };
        payment.resolve(status, trade_no, at);
        Ok(Some(payment.clone()))
    }

    async fn cancel(&self, id: PaymentId, at: DateTime<Utc>) -> Result<Option<Payment>> {
        let mut state = self.state.write().unwrap();
        Self::check_writable(&state)?;
        let Some(payment) = state
            .payments
            .get_mut(&id)
            .filter(|p| p.status.is_pending())
        else {
            return Ok(None);
        };
        payment.resolve(PaymentStatus::Cancelled, "", at);
        Ok(Some(payment.clone()))
    }
}

#[cfg(test)]
mod tests {
    use common::{Money, UserId};
    use domain::PaymentType;

    use super::*;

    fn draft(order: i64, no: &str) -> NewPayment {
        NewPayment {
            order_id: OrderId::new(order),
            user_id: UserId::new(1),
            payment_no: no.to_string(),
            amount: Money::from_cents(5000),
            payment_type: PaymentType::Alipay,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_one_live_payment_per_order() {
        let store = InMemoryPaymentStore::new();
        let first = store.insert_if_absent(&draft(1, "PAY1")).await.unwrap();
        assert!(first.is_some());
        assert!(store.insert_if_absent(&draft(1, "PAY2")).await.unwrap().is_none());

        // A cancelled payment frees the slot.
        store.cancel(first.unwrap().id, Utc::now()).await.unwrap();
        let second = store.insert_if_absent(&draft(1, "PAY3")).await.unwrap();
        assert_eq!(second.unwrap().payment_no, "PAY3");
        assert_eq!(
            store
                .find_by_order(OrderId::new(1))
                .await
                .unwrap()
                .unwrap()
                .payment_no,
            "PAY3"
        );
    }

    #[tokio::test]
    async fn test_resolve_only_once() {
        let store = InMemoryPaymentStore::new();
        store.insert_if_absent(&draft(1, "PAY1")).await.unwrap();

        let won = store
            .resolve("PAY1", PaymentStatus::Success, "T1", Utc::now())
            .await
            .unwrap();
        assert_eq!(won.unwrap().trade_no.as_deref(), Some("T1"));

        let lost = store
            .resolve("PAY1", PaymentStatus::Failed, "T2", Utc::now())
            .await
            .unwrap();
        assert!(lost.is_none());
        assert_eq!(
            store.find_by_no("PAY1").await.unwrap().unwrap().status,
            PaymentStatus::Success
        );
    }

    #[tokio::test]
    async fn test_resolved_payment_cannot_be_cancelled() {
        let store = InMemoryPaymentStore::new();
        let payment = store
            .insert_if_absent(&draft(1, "PAY1"))
            .await
            .unwrap()
            .unwrap();
        store
            .resolve("PAY1", PaymentStatus::Failed, "", Utc::now())
            .await
            .unwrap();

        assert!(store.cancel(payment.id, Utc::now()).await.unwrap().is_none());
    }
}
