//! Integration tests for payment creation and gateway callbacks.

use std::sync::Arc;
use std::time::Duration;

use common::{Money, OrderId, UserId};
use domain::{
    CreatePayment, DomainError, OrderStatus, PaymentCallback, PaymentStatus, PaymentType,
};
use event_bus::{InMemoryEventPublisher, RetryPolicy, TaskQueue, Topic};
use payment::{
    InMemoryOrderClient, InMemoryPaymentStore, PaymentConfig, PaymentError, PaymentResolved,
    PaymentService,
};

const USER: UserId = UserId::new(7);

struct TestHarness {
    service: PaymentService<InMemoryPaymentStore, InMemoryOrderClient>,
    store: InMemoryPaymentStore,
    orders: InMemoryOrderClient,
    publisher: InMemoryEventPublisher,
    tasks: TaskQueue,
    order_id: OrderId,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryPaymentStore::new();
        let orders = InMemoryOrderClient::new();
        let publisher = InMemoryEventPublisher::new();
        let tasks = TaskQueue::spawn(
            64,
            RetryPolicy {
                max_attempts: 2,
                attempt_timeout: Duration::from_secs(1),
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
        );
        let order_id = orders.add_order(1, USER, 5000, OrderStatus::Pending);
        let service = PaymentService::new(
            store.clone(),
            orders.clone(),
            Arc::new(publisher.clone()),
            tasks.clone(),
        );

        Self {
            service,
            store,
            orders,
            publisher,
            tasks,
            order_id,
        }
    }

    fn create_cmd(&self) -> CreatePayment {
        CreatePayment::new(
            self.order_id,
            USER,
            Money::from_cents(5000),
            PaymentType::Alipay,
        )
    }

    async fn open_payment(&self) -> String {
        self.service
            .create_payment(self.create_cmd())
            .await
            .unwrap()
            .payment
            .payment_no
    }

    fn success(&self, payment_no: &str) -> PaymentCallback {
        PaymentCallback::new(
            payment_no,
            self.order_id,
            2,
            Money::from_cents(5000),
            "TRADE-1",
        )
    }
}

#[tokio::test]
async fn test_create_payment_for_pending_order() {
    let h = TestHarness::new();

    let created = h.service.create_payment(h.create_cmd()).await.unwrap();

    assert_eq!(created.payment.status, PaymentStatus::Pending);
    assert_eq!(created.payment.amount, Money::from_cents(5000));
    assert!(created.payment.payment_no.starts_with("PAY"));
    assert_eq!(
        created.pay_url,
        Some(format!(
            "http://mock-payment.com/pay?payment_no={}",
            created.payment.payment_no
        ))
    );
}

#[tokio::test]
async fn test_create_payment_is_idempotent_by_order() {
    let h = TestHarness::new();

    let first = h.service.create_payment(h.create_cmd()).await.unwrap();
    let second = h.service.create_payment(h.create_cmd()).await.unwrap();

    assert_eq!(first.payment.id, second.payment.id);
    assert_eq!(h.store.payment_count(), 1);
}

#[tokio::test]
async fn test_concurrent_creates_share_one_payment() {
    let h = TestHarness::new();

    let attempts = (0..10).map(|_| h.service.create_payment(h.create_cmd()));
    let results = futures_util::future::join_all(attempts).await;

    let ids: std::collections::HashSet<_> = results
        .into_iter()
        .map(|r| r.unwrap().payment.id)
        .collect();
    assert_eq!(ids.len(), 1);
    assert_eq!(h.store.payment_count(), 1);
}

#[tokio::test]
async fn test_create_payment_rejects_wrong_amount() {
    let h = TestHarness::new();
    let cmd = CreatePayment {
        amount: Money::from_cents(4999),
        ..h.create_cmd()
    };

    let result = h.service.create_payment(cmd).await;

    assert!(matches!(
        result,
        Err(PaymentError::AmountMismatch { expected, actual })
            if expected == Money::from_cents(5000) && actual == Money::from_cents(4999)
    ));
    assert_eq!(h.store.payment_count(), 0);
}

#[tokio::test]
async fn test_create_payment_requires_pending_owned_order() {
    let h = TestHarness::new();
    let paid = h.orders.add_order(2, USER, 100, OrderStatus::Paid);

    let result = h
        .service
        .create_payment(CreatePayment::new(
            paid,
            USER,
            Money::from_cents(100),
            PaymentType::Wechat,
        ))
        .await;
    assert!(matches!(
        result,
        Err(PaymentError::OrderNotPending {
            status: OrderStatus::Paid,
            ..
        })
    ));

    let stranger = CreatePayment {
        user_id: UserId::new(8),
        ..h.create_cmd()
    };
    assert!(matches!(
        h.service.create_payment(stranger).await,
        Err(PaymentError::OrderNotFound(_))
    ));

    let zero = CreatePayment {
        amount: Money::zero(),
        ..h.create_cmd()
    };
    assert!(matches!(
        h.service.create_payment(zero).await,
        Err(PaymentError::Domain(DomainError::Validation(_)))
    ));
}

#[tokio::test]
async fn test_pay_url_is_omitted_without_mock_gateway() {
    let h = TestHarness::new();
    let service = PaymentService::new(
        h.store.clone(),
        h.orders.clone(),
        Arc::new(h.publisher.clone()),
        h.tasks.clone(),
    )
    .with_config(PaymentConfig {
        mock_gateway: false,
        ..PaymentConfig::default()
    });

    let created = service.create_payment(h.create_cmd()).await.unwrap();
    assert!(created.pay_url.is_none());
}

#[tokio::test]
async fn test_duplicate_success_callback_updates_order_once() {
    let h = TestHarness::new();
    let payment_no = h.open_payment().await;

    let first = h.service.handle_callback(h.success(&payment_no)).await.unwrap();
    let second = h.service.handle_callback(h.success(&payment_no)).await.unwrap();

    assert!(first.success);
    assert!(!first.is_duplicate());
    assert!(second.success);
    assert_eq!(second.message, "payment already processed");

    assert_eq!(h.orders.status_updates().len(), 1);
    assert_eq!(h.orders.status_updates()[0].status, OrderStatus::Paid);
    assert_eq!(h.orders.status_of(h.order_id), Some(OrderStatus::Paid));

    let payment = h
        .service
        .get_payment_by_order(h.order_id, USER)
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.trade_no.as_deref(), Some("TRADE-1"));
    assert!(payment.paid_at.is_some());

    h.tasks.wait_idle().await;
    let events = h.publisher.published_to(Topic::PaymentSuccess);
    assert_eq!(events.len(), 1);
    let body: PaymentResolved = events[0].data_as().unwrap();
    assert_eq!(body.order_id, h.order_id);
    assert_eq!(body.trade_no.as_deref(), Some("TRADE-1"));
}

#[tokio::test]
async fn test_concurrent_callbacks_resolve_once() {
    let h = TestHarness::new();
    let payment_no = h.open_payment().await;

    let deliveries = (0..8).map(|_| h.service.handle_callback(h.success(&payment_no)));
    let outcomes = futures_util::future::join_all(deliveries).await;

    let winners = outcomes
        .into_iter()
        .map(Result::unwrap)
        .filter(|o| !o.is_duplicate())
        .count();
    assert_eq!(winners, 1);
    assert_eq!(h.orders.status_updates().len(), 1);
}

#[tokio::test]
async fn test_failed_callback_leaves_order_pending() {
    let h = TestHarness::new();
    let payment_no = h.open_payment().await;

    let callback = PaymentCallback {
        status: 3,
        ..h.success(&payment_no)
    };
    h.service.handle_callback(callback).await.unwrap();

    let payment = h.store.get_by_no(&payment_no).unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(payment.trade_no.is_none());
    assert!(payment.paid_at.is_none());
    assert!(h.orders.status_updates().is_empty());

    h.tasks.wait_idle().await;
    let events = h.publisher.published_to(Topic::PaymentFailed);
    assert_eq!(events.len(), 1);
    let body: PaymentResolved = events[0].data_as().unwrap();
    assert_eq!(body.reason.as_deref(), Some("payment failed"));
}

#[tokio::test]
async fn test_callback_amount_mismatch_is_rejected() {
    let h = TestHarness::new();
    let payment_no = h.open_payment().await;

    let callback = PaymentCallback {
        amount: Money::from_cents(1),
        ..h.success(&payment_no)
    };
    let result = h.service.handle_callback(callback).await;

    assert!(matches!(result, Err(PaymentError::AmountMismatch { .. })));
    assert_eq!(
        h.store.get_by_no(&payment_no).unwrap().status,
        PaymentStatus::Pending
    );
    assert!(h.orders.status_updates().is_empty());
}

#[tokio::test]
async fn test_callback_validation() {
    let h = TestHarness::new();
    let payment_no = h.open_payment().await;

    let unknown_status = PaymentCallback {
        status: 9,
        ..h.success(&payment_no)
    };
    assert!(h.service.handle_callback(unknown_status).await.is_err());

    let wrong_order = PaymentCallback {
        order_id: OrderId::new(99),
        ..h.success(&payment_no)
    };
    assert!(matches!(
        h.service.handle_callback(wrong_order).await,
        Err(PaymentError::Validation(_))
    ));

    assert!(matches!(
        h.service.handle_callback(h.success("PAY-NOPE")).await,
        Err(PaymentError::PaymentNumberNotFound(_))
    ));

    assert_eq!(
        h.store.get_by_no(&payment_no).unwrap().status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn test_order_update_failure_keeps_payment() {
    let h = TestHarness::new();
    let payment_no = h.open_payment().await;
    h.orders.set_fail_on_update(true);

    let outcome = h.service.handle_callback(h.success(&payment_no)).await.unwrap();

    assert!(outcome.success);
    assert_eq!(
        h.store.get_by_no(&payment_no).unwrap().status,
        PaymentStatus::Success
    );
    assert_eq!(h.orders.status_of(h.order_id), Some(OrderStatus::Pending));

    // A redelivery does not retry the order update.
    let again = h.service.handle_callback(h.success(&payment_no)).await.unwrap();
    assert!(again.is_duplicate());
    assert_eq!(h.orders.status_updates().len(), 1);
}

#[tokio::test]
async fn test_cancel_payment_frees_the_order() {
    let h = TestHarness::new();
    let first = h.service.create_payment(h.create_cmd()).await.unwrap().payment;

    let cancelled = h.service.cancel_payment(first.id, USER).await.unwrap();
    assert_eq!(cancelled.status, PaymentStatus::Cancelled);

    assert!(matches!(
        h.service.get_payment_by_order(h.order_id, USER).await,
        Err(PaymentError::NoPaymentForOrder(_))
    ));

    let second = h.service.create_payment(h.create_cmd()).await.unwrap().payment;
    assert_ne!(second.id, first.id);

    // The cancelled payment's callback is acknowledged and ignored.
    let late = h
        .service
        .handle_callback(h.success(&first.payment_no))
        .await
        .unwrap();
    assert!(late.is_duplicate());
    assert!(h.orders.status_updates().is_empty());
}

#[tokio::test]
async fn test_cancel_resolved_payment_is_refused() {
    let h = TestHarness::new();
    let payment_no = h.open_payment().await;
    h.service.handle_callback(h.success(&payment_no)).await.unwrap();
    let payment = h.store.get_by_no(&payment_no).unwrap();

    let result = h.service.cancel_payment(payment.id, USER).await;

    assert!(matches!(
        result,
        Err(PaymentError::PaymentNotPending {
            status: PaymentStatus::Success,
            ..
        })
    ));
}

#[tokio::test]
async fn test_queries_are_scoped_to_owner() {
    let h = TestHarness::new();
    let payment = h.service.create_payment(h.create_cmd()).await.unwrap().payment;

    assert_eq!(
        h.service.query_payment(payment.id, USER).await.unwrap().id,
        payment.id
    );
    assert!(matches!(
        h.service.query_payment(payment.id, UserId::new(8)).await,
        Err(PaymentError::PaymentNotFound(_))
    ));
    assert!(matches!(
        h.service.get_payment_by_order(h.order_id, UserId::new(8)).await,
        Err(PaymentError::NoPaymentForOrder(_))
    ));
}
