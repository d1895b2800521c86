use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, PAYMENT_NUMBERS, PaymentId, UserId};
use domain::{
    CreatePayment, NewPayment, OrderStatus, Payment, PaymentCallback, PaymentStatus,
    UpdateOrderStatus,
};
use event_bus::{EventPublisher, IntegrationEvent, TaskQueue, Topic};
use serde::{Deserialize, Serialize};

use crate::client::OrderClient;
use crate::config::PaymentConfig;
use crate::error::{PaymentError, Result};
use crate::events::PaymentResolved;
use crate::store::PaymentStore;

const ALREADY_PROCESSED: &str = "payment already processed";

/// A payment handed to the payer, with the link to pay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPayment {
    pub payment: Payment,
    pub pay_url: Option<String>,
}

/// Acknowledgement returned to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackOutcome {
    pub success: bool,
    pub message: String,
}

impl CallbackOutcome {
    fn processed() -> Self {
        Self {
            success: true,
            message: "ok".to_string(),
        }
    }

    fn already_processed() -> Self {
        Self {
            success: true,
            message: ALREADY_PROCESSED.to_string(),
        }
    }

    /// Returns true if this call changed nothing.
    pub fn is_duplicate(&self) -> bool {
        self.message == ALREADY_PROCESSED
    }
}

/// Payment ledger: creation and gateway callbacks.
///
/// Each order has at most one live payment, and each payment leaves pending
/// exactly once, so gateways may deliver a callback any number of times.
pub struct PaymentService<S, O> {
    store: S,
    orders: O,
    publisher: Arc<dyn EventPublisher>,
    tasks: TaskQueue,
    config: PaymentConfig,
}

impl<S: PaymentStore, O: OrderClient> PaymentService<S, O> {
    /// Creates a payment service with default settings.
    pub fn new(store: S, orders: O, publisher: Arc<dyn EventPublisher>, tasks: TaskQueue) -> Self {
        Self {
            store,
            orders,
            publisher,
            tasks,
            config: PaymentConfig::default(),
        }
    }

    /// Replaces the settings.
    pub fn with_config(mut self, config: PaymentConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns a reference to the payment store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Opens a payment for a pending order, or returns the one it already has.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, user_id = %cmd.user_id))]
    pub async fn create_payment(&self, cmd: CreatePayment) -> Result<CreatedPayment> {
        cmd.validate()?;

        let order = self.orders.get_order(cmd.order_id, cmd.user_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(PaymentError::OrderNotPending {
                order_id: order.id,
                status: order.status,
            });
        }
        if cmd.amount != order.total_amount {
            return Err(PaymentError::AmountMismatch {
                expected: order.total_amount,
                actual: cmd.amount,
            });
        }

        if let Some(existing) = self.store.find_by_order(order.id).await? {
            tracing::info!(payment_no = %existing.payment_no, "payment already exists for order");
            return Ok(self.created(existing));
        }

        let draft = NewPayment {
            order_id: order.id,
            user_id: cmd.user_id,
            payment_no: PAYMENT_NUMBERS.next_number(),
            amount: order.total_amount,
            payment_type: cmd.payment_type,
            created_at: Utc::now(),
        };
        let payment = match self.store.insert_if_absent(&draft).await? {
            Some(payment) => {
                metrics::counter!("payments_created_total").increment(1);
                tracing::info!(payment_id = %payment.id, payment_no = %payment.payment_no, "payment created");
                payment
            }
            // A concurrent create won the slot.
            None => self
                .store
                .find_by_order(order.id)
                .await?
                .ok_or_else(|| PaymentError::Store("live payment disappeared".to_string()))?,
        };

        Ok(self.created(payment))
    }

    /// Applies the gateway's verdict to a pending payment.
    ///
    /// A payment that is no longer pending is acknowledged without any
    /// change, so repeated deliveries are harmless.
    #[tracing::instrument(skip(self, callback), fields(payment_no = %callback.payment_no, status = callback.status))]
    pub async fn handle_callback(&self, callback: PaymentCallback) -> Result<CallbackOutcome> {
        callback.validate()?;
        if !callback.order_id.is_valid() {
            return Err(PaymentError::Validation("invalid order_id".to_string()));
        }

        let payment = self
            .store
            .find_by_no(&callback.payment_no)
            .await?
            .ok_or_else(|| PaymentError::PaymentNumberNotFound(callback.payment_no.clone()))?;
        if payment.order_id != callback.order_id {
            self.count_callback("rejected");
            return Err(PaymentError::Validation(
                "order_id does not match the payment".to_string(),
            ));
        }

        if !payment.status.is_pending() {
            tracing::info!(current = %payment.status, "payment already processed");
            self.count_callback("duplicate");
            return Ok(CallbackOutcome::already_processed());
        }

        if callback.amount != payment.amount {
            tracing::warn!(expected = %payment.amount, got = %callback.amount, "callback amount mismatch");
            self.count_callback("rejected");
            return Err(PaymentError::AmountMismatch {
                expected: payment.amount,
                actual: callback.amount,
            });
        }

        let status = PaymentStatus::from_callback_code(callback.status)?;
        let now = Utc::now();
        let Some(resolved) = self
            .store
            .resolve(&payment.payment_no, status, &callback.trade_no, now)
            .await?
        else {
            // Another delivery of the same callback got there first.
            self.count_callback("duplicate");
            return Ok(CallbackOutcome::already_processed());
        };

        if status == PaymentStatus::Success {
            let update = UpdateOrderStatus::new(resolved.order_id, OrderStatus::Paid).at(now);
            match self.orders.update_order_status(update).await {
                Ok(()) => tracing::info!(order_id = %resolved.order_id, "order marked paid"),
                Err(e) => {
                    // The payment stays successful; reconciliation closes the gap.
                    metrics::counter!("payment_order_update_failed_total").increment(1);
                    tracing::error!(order_id = %resolved.order_id, error = %e, "order not marked paid after successful payment");
                }
            }
        }

        let topic = match status {
            PaymentStatus::Success => Topic::PaymentSuccess,
            _ => Topic::PaymentFailed,
        };
        self.publish(topic, &resolved);
        self.count_callback(status.as_str());
        tracing::info!(payment_id = %resolved.id, %status, "payment resolved");

        Ok(CallbackOutcome::processed())
    }

    /// Cancels a pending payment owned by `user_id`.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_payment(&self, payment_id: PaymentId, user_id: UserId) -> Result<Payment> {
        let payment = self.query_payment(payment_id, user_id).await?;
        if !payment.status.is_pending() {
            return Err(PaymentError::PaymentNotPending {
                payment_id,
                status: payment.status,
            });
        }

        match self.store.cancel(payment_id, Utc::now()).await? {
            Some(cancelled) => {
                tracing::info!(payment_no = %cancelled.payment_no, "payment cancelled");
                Ok(cancelled)
            }
            None => {
                let status = self
                    .store
                    .find(payment_id)
                    .await?
                    .map_or(payment.status, |p| p.status);
                Err(PaymentError::PaymentNotPending { payment_id, status })
            }
        }
    }

    /// Returns a payment owned by `user_id`.
    #[tracing::instrument(skip(self))]
    pub async fn query_payment(&self, payment_id: PaymentId, user_id: UserId) -> Result<Payment> {
        if !payment_id.is_valid() {
            return Err(PaymentError::Validation("invalid payment_id".to_string()));
        }
        self.store
            .find(payment_id)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or(PaymentError::PaymentNotFound(payment_id))
    }

    /// Returns the live payment of an order owned by `user_id`.
    #[tracing::instrument(skip(self))]
    pub async fn get_payment_by_order(&self, order_id: OrderId, user_id: UserId) -> Result<Payment> {
        if !order_id.is_valid() {
            return Err(PaymentError::Validation("invalid order_id".to_string()));
        }
        self.store
            .find_by_order(order_id)
            .await?
            .filter(|p| p.user_id == user_id)
            .ok_or(PaymentError::NoPaymentForOrder(order_id))
    }

    fn created(&self, payment: Payment) -> CreatedPayment {
        CreatedPayment {
            pay_url: self.config.pay_url(&payment.payment_no),
            payment,
        }
    }

    fn count_callback(&self, outcome: &'static str) {
        metrics::counter!("payment_callbacks_total", "outcome" => outcome).increment(1);
    }

    fn publish(&self, topic: Topic, payment: &Payment) {
        match IntegrationEvent::new(topic, &payment.payment_no, &PaymentResolved::from_payment(payment)) {
            Ok(event) => self.tasks.publish(self.publisher.clone(), event),
            Err(e) => tracing::error!(%topic, error = %e, "event not encoded"),
        }
    }
}
