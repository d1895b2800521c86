//! Payment callbacks driving a real order service.

use std::sync::Arc;

use common::{Money, UserId};
use domain::{CreateOrder, CreatePayment, OrderLine, OrderStatus, PaymentCallback, PaymentType};
use event_bus::{EventPublisher, InMemoryEventPublisher, RetryPolicy, TaskQueue, Topic};
use payment::{InMemoryPaymentStore, PaymentService};
use saga::{
    InMemoryCartClient, InMemoryIntentStore, InMemoryOrderStore, InMemoryProductClient,
    OrderService,
};

#[tokio::test]
async fn test_paid_order_cannot_be_cancelled() {
    let user = UserId::new(3);
    let publisher = InMemoryEventPublisher::new();
    let shared: Arc<dyn EventPublisher> = Arc::new(publisher.clone());
    let tasks = TaskQueue::spawn(64, RetryPolicy::default());

    let products = InMemoryProductClient::new();
    let mug = products.add_product(1, "Mug", 2500, 4);

    let orders = Arc::new(OrderService::new(
        InMemoryOrderStore::new(),
        InMemoryIntentStore::new(),
        products.clone(),
        InMemoryCartClient::new(),
        shared.clone(),
        tasks.clone(),
    ));
    let payments = PaymentService::new(
        InMemoryPaymentStore::new(),
        orders.clone(),
        shared,
        tasks.clone(),
    );

    let order = orders
        .create_order(CreateOrder::new(user, vec![OrderLine::new(mug, 2)]))
        .await
        .unwrap();
    assert_eq!(order.total_amount, Money::from_cents(5000));

    let created = payments
        .create_payment(CreatePayment::new(
            order.order_id,
            user,
            order.total_amount,
            PaymentType::CreditCard,
        ))
        .await
        .unwrap();

    let callback = PaymentCallback::new(
        created.payment.payment_no.clone(),
        order.order_id,
        2,
        order.total_amount,
        "T-42",
    );
    payments.handle_callback(callback.clone()).await.unwrap();
    assert!(payments.handle_callback(callback).await.unwrap().is_duplicate());

    let stored = orders.get_order(order.order_id, user).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
    assert!(stored.paid_at.is_some());

    let cancel = orders.cancel_order(order.order_id, user).await.unwrap();
    assert!(!cancel.success);
    assert_eq!(cancel.message, "Order has been paid and cannot be cancelled");
    assert_eq!(products.stock_of(mug), Some(2));

    tasks.wait_idle().await;
    assert_eq!(publisher.published_to(Topic::PaymentSuccess).len(), 1);
    assert_eq!(publisher.published_to(Topic::OrderStatusChanged).len(), 1);
}
