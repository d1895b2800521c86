//! The order saga.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{Money, ORDER_NUMBERS, OrderId, UserId};
use domain::{
    CreateOrder, DomainError, NewOrder, Order, OrderItem, OrderStatus, UpdateOrderStatus,
};
use event_bus::{EventPublisher, IntegrationEvent, TaskQueue, Topic};
use serde::{Deserialize, Serialize};

use crate::clients::{CartClient, ProductClient};
use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::events::{
    OrderCancelled, OrderCreated, OrderStatusChanged, StockCompensationFailed, StockLineEvent,
};
use crate::outbox::{IntentState, StockIntent, StockIntentStore};
use crate::store::{OrderPage, OrderQuery, OrderStore, OrderTx};

const ORDER_NOT_FOUND: &str = "Order not found";
const ORDER_CANCELLED: &str = "Order cancelled successfully";
const CANNOT_CANCEL: &str = "Order cannot be cancelled";

/// What a successful CreateOrder hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderResult {
    pub order_id: OrderId,
    pub order_no: String,
    pub total_amount: Money,
}

/// Result of a cancellation request. A refusal is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub success: bool,
    pub message: String,
}

impl CancelOutcome {
    fn cancelled() -> Self {
        Self {
            success: true,
            message: ORDER_CANCELLED.to_string(),
        }
    }

    fn refused(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
        }
    }
}

/// Orchestrates order creation, cancellation and status changes across the
/// order store, the stock ledger and the cart.
///
/// CreateOrder runs these steps:
/// 1. Look up authoritative price, name and image per line
/// 2. Insert the order and its items in a local transaction
/// 3. Record a stock intent, then deduct stock remotely
/// 4. Commit, handing the stock back if the commit fails
/// 5. Queue the `order.created` event and the cart clear
pub struct OrderService<O, I, P, C> {
    orders: O,
    intents: I,
    products: P,
    cart: Arc<C>,
    publisher: Arc<dyn EventPublisher>,
    tasks: TaskQueue,
    config: SagaConfig,
}

impl<O, I, P, C> OrderService<O, I, P, C>
where
    O: OrderStore,
    I: StockIntentStore,
    P: ProductClient,
    C: CartClient + 'static,
{
    /// Creates a new order service with default tunables.
    pub fn new(
        orders: O,
        intents: I,
        products: P,
        cart: C,
        publisher: Arc<dyn EventPublisher>,
        tasks: TaskQueue,
    ) -> Self {
        Self {
            orders,
            intents,
            products,
            cart: Arc::new(cart),
            publisher,
            tasks,
            config: SagaConfig::default(),
        }
    }

    /// Replaces the tunables.
    pub fn with_config(mut self, config: SagaConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns a reference to the order store.
    pub fn orders(&self) -> &O {
        &self.orders
    }

    /// Returns a reference to the stock-intent store.
    pub fn intents(&self) -> &I {
        &self.intents
    }

    /// Returns the background task queue.
    pub fn tasks(&self) -> &TaskQueue {
        &self.tasks
    }

    /// Places an order, deducting its stock.
    #[tracing::instrument(skip(self, cmd), fields(user_id = %cmd.user_id, items = cmd.items.len()))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<CreateOrderResult> {
        let started = Instant::now();
        cmd.validate()?;

        let mut items = Vec::with_capacity(cmd.items.len());
        for line in &cmd.items {
            let product = self.products.get_product(line.product_id).await?;
            items.push(OrderItem {
                product_id: product.id,
                product_name: product.name,
                product_image: product.image,
                price: product.price,
                quantity: line.quantity,
            });
        }

        let draft = NewOrder::new(
            cmd.user_id,
            ORDER_NUMBERS.next_number(),
            items,
            cmd.address,
            cmd.phone,
            cmd.remark,
        )?;
        let deduction = draft.deduction();
        let order_no = draft.order_no.clone();

        let mut tx = self.orders.begin().await?;
        let order = match tx.insert_order(&draft).await {
            Ok(order) => order,
            Err(e) => {
                self.rollback(tx, &order_no).await;
                return Err(self.create_failed("insert", e));
            }
        };

        let mut intent = StockIntent::pending(&order_no, draft.user_id, deduction.clone());
        if let Err(e) = self.intents.save(&intent).await {
            self.rollback(tx, &order_no).await;
            return Err(self.create_failed("intent", e));
        }

        if let Err(e) = self.products.batch_update_stock(&deduction).await {
            tracing::warn!(%order_no, error = %e, "stock deduction refused");
            self.rollback(tx, &order_no).await;
            self.settle(&mut intent, IntentState::Aborted).await;
            return Err(self.create_failed("stock", e));
        }

        if let Err(commit_error) = tx.commit().await {
            tracing::error!(%order_no, error = %commit_error, "order commit failed after stock deduction");
            self.restore_stock(&mut intent, &commit_error.to_string()).await;
            return Err(self.create_failed(
                "commit",
                SagaError::OrderNotPersisted(commit_error.to_string()),
            ));
        }

        self.settle(&mut intent, IntentState::Applied).await;

        self.publish(
            Topic::OrderCreated,
            &order.order_no,
            &OrderCreated::from_order(&order),
        );
        self.clear_cart_later(order.user_id);

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(order_id = %order.id, %order_no, total = %order.total_amount, "order created");

        Ok(CreateOrderResult {
            order_id: order.id,
            order_no: order.order_no,
            total_amount: order.total_amount,
        })
    }

    /// Cancels a pending order owned by `user_id` and hands its stock back.
    ///
    /// Orders in any other status are refused with a message, not an error.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId, user_id: UserId) -> Result<CancelOutcome> {
        let Some(order) = self
            .orders
            .find(order_id)
            .await?
            .filter(|o| o.is_owned_by(user_id))
        else {
            tracing::info!("cancel refused: order not found");
            return Ok(CancelOutcome::refused(ORDER_NOT_FOUND));
        };

        if let Some(reason) = order.status.cancellation_refusal() {
            tracing::info!(status = %order.status, "cancel refused");
            return Ok(CancelOutcome::refused(reason));
        }

        let cancelled_at = Utc::now();
        let Some(order) = self
            .orders
            .transition_status(order.id, OrderStatus::Pending, OrderStatus::Cancelled, cancelled_at)
            .await?
        else {
            // Someone moved the order between the read and the write.
            let reason = self
                .orders
                .find(order_id)
                .await?
                .and_then(|o| o.status.cancellation_refusal())
                .unwrap_or(CANNOT_CANCEL);
            return Ok(CancelOutcome::refused(reason));
        };

        let mut intent = match self.intents.find(&order.order_no).await {
            Ok(Some(intent)) => intent,
            Ok(None) => self.intent_for(&order),
            Err(e) => {
                tracing::warn!(order_no = %order.order_no, error = %e, "stock intent lookup failed");
                self.intent_for(&order)
            }
        };
        self.restore_stock(&mut intent, "order cancelled").await;

        self.publish(
            Topic::OrderCancelled,
            &order.order_no,
            &OrderCancelled::from_order(&order, cancelled_at),
        );
        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(order_no = %order.order_no, "order cancelled");

        Ok(CancelOutcome::cancelled())
    }

    /// Moves an order forward to paid, shipped or completed.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, status = %cmd.status))]
    pub async fn update_order_status(&self, cmd: UpdateOrderStatus) -> Result<Order> {
        cmd.validate()?;

        let order = self
            .orders
            .find(cmd.order_id)
            .await?
            .ok_or(SagaError::OrderNotFound(cmd.order_id))?;
        order.status.ensure_transition(cmd.status)?;

        let operated_at = cmd.operated_at.unwrap_or_else(Utc::now);
        let Some(updated) = self
            .orders
            .transition_status(order.id, order.status, cmd.status, operated_at)
            .await?
        else {
            let current = self
                .orders
                .find(order.id)
                .await?
                .map_or(order.status, |o| o.status);
            return Err(DomainError::InvalidStatusTransition {
                from: current,
                to: cmd.status,
            }
            .into());
        };

        self.publish(
            Topic::OrderStatusChanged,
            &updated.order_no,
            &OrderStatusChanged {
                order_id: updated.id,
                order_no: updated.order_no.clone(),
                user_id: updated.user_id,
                old_status: order.status,
                new_status: updated.status,
                operated_at,
            },
        );
        metrics::counter!("order_status_changes_total", "status" => cmd.status.as_str())
            .increment(1);
        tracing::info!(from = %order.status, to = %updated.status, "order status updated");

        Ok(updated)
    }

    /// Returns an order owned by `user_id`.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        self.orders
            .find(order_id)
            .await?
            .filter(|o| o.is_owned_by(user_id))
            .ok_or(SagaError::OrderNotFound(order_id))
    }

    /// Returns an order owned by `user_id` by its order number.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_by_no(&self, order_no: &str, user_id: UserId) -> Result<Order> {
        self.orders
            .find_by_no(order_no)
            .await?
            .filter(|o| o.is_owned_by(user_id))
            .ok_or_else(|| SagaError::OrderNumberNotFound(order_no.to_string()))
    }

    /// Lists a user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, query: OrderQuery) -> Result<OrderPage> {
        if !query.user_id.is_valid() {
            return Err(DomainError::validation("user_id must be positive").into());
        }
        self.orders.list_by_user(&query.normalized()).await
    }

    fn intent_for(&self, order: &Order) -> StockIntent {
        let deduction = order.restoration().iter().map(|d| d.inverse()).collect();
        StockIntent::applied(&order.order_no, order.user_id, deduction)
    }

    async fn rollback(&self, tx: O::Tx, order_no: &str) {
        if let Err(e) = tx.rollback().await {
            tracing::warn!(order_no, error = %e, "order rollback failed");
        }
    }

    fn create_failed(&self, reason: &'static str, error: SagaError) -> SagaError {
        metrics::counter!("orders_create_failed_total", "reason" => reason).increment(1);
        error
    }

    /// Moves an intent to `state` and saves it. A failed save leaves the
    /// stored intent pending, which the reconciler resolves later.
    async fn settle(&self, intent: &mut StockIntent, state: IntentState) {
        if let Err(e) = intent.transition(state) {
            tracing::warn!(order_no = %intent.order_no, error = %e, "stock intent not updated");
            return;
        }
        if let Err(e) = self.intents.save(intent).await {
            tracing::warn!(order_no = %intent.order_no, %state, error = %e, "stock intent not saved");
        }
    }

    /// Hands an intent's stock back. On failure the intent is parked for the
    /// reconciler and the dead-letter event is queued.
    async fn restore_stock(&self, intent: &mut StockIntent, original_error: &str) {
        let restoration = intent.restoration();
        match self.products.batch_update_stock(&restoration).await {
            Ok(()) => {
                metrics::counter!("stock_compensations_total", "outcome" => "restored")
                    .increment(1);
                tracing::info!(order_no = %intent.order_no, "stock restored");
                self.settle(intent, IntentState::Compensated).await;
            }
            Err(e) => {
                metrics::counter!("stock_compensation_failed_total").increment(1);
                tracing::error!(
                    order_no = %intent.order_no,
                    original_error,
                    compensation_error = %e,
                    items = ?restoration,
                    "CRITICAL_STOCK_COMPENSATION_FAILED"
                );

                match intent.compensation_failed(e.to_string()) {
                    Ok(()) => {
                        if let Err(save_error) = self.intents.save(intent).await {
                            tracing::error!(order_no = %intent.order_no, error = %save_error, "failed compensation not recorded");
                        }
                    }
                    Err(state_error) => {
                        tracing::warn!(order_no = %intent.order_no, error = %state_error, "stock intent not updated");
                    }
                }

                self.publish(
                    Topic::StockCompensationFailed,
                    &intent.order_no,
                    &StockCompensationFailed {
                        order_no: intent.order_no.clone(),
                        user_id: intent.user_id,
                        items: StockLineEvent::from_restoration(&restoration),
                        original_error: original_error.to_string(),
                        compensation_error: e.to_string(),
                        retry_count: intent.retry_count,
                        max_retries: self.config.max_compensation_retries,
                    },
                );
            }
        }
    }

    fn publish<T: Serialize>(&self, topic: Topic, key: &str, payload: &T) {
        match IntegrationEvent::new(topic, key, payload) {
            Ok(event) => self.tasks.publish(self.publisher.clone(), event),
            Err(e) => tracing::error!(%topic, key, error = %e, "event not encoded"),
        }
    }

    fn clear_cart_later(&self, user_id: UserId) {
        let cart = self.cart.clone();
        let queued = self
            .tasks
            .submit("clear_cart", user_id.to_string(), move || {
                let cart = cart.clone();
                Box::pin(async move { cart.clear_cart(user_id).await.map_err(|e| e.to_string()) })
            });
        if let Err(e) = queued {
            tracing::warn!(%user_id, error = %e, "cart clear not queued");
        }
    }
}
