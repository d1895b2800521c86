//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::config::Config;
use api::state::{AppState, InMemoryBackend};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use event_bus::{EventPublisher, InMemoryEventPublisher, Topic};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

const USER: &str = "7";

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn call(
    router: &axum::Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

struct TestHarness {
    app: axum::Router,
    internal: axum::Router,
    state: Arc<AppState<InMemoryBackend>>,
    publisher: InMemoryEventPublisher,
}

impl TestHarness {
    fn new() -> Self {
        let publisher = InMemoryEventPublisher::new();
        let shared: Arc<dyn EventPublisher> = Arc::new(publisher.clone());
        let state = AppState::in_memory(shared, &Config::default());
        let app = api::create_app(state.clone(), get_metrics_handle(), Duration::from_secs(10));
        let internal = api::create_internal_app(state.clone(), Duration::from_secs(10));
        Self {
            app,
            internal,
            state,
            publisher,
        }
    }

    async fn send(&self, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        call(&self.app, method, uri, user, body).await
    }

    async fn send_internal(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        call(&self.internal, method, uri, None, body).await
    }

    async fn add_product(&self, name: &str, cents: i64, stock: i64) -> i64 {
        let (status, body) = self
            .send(
                "POST",
                "/products",
                None,
                Some(json!({
                    "name": name,
                    "description": format!("A fine {name}"),
                    "price": cents,
                    "stock": stock,
                    "category": "kitchen",
                    "images": [format!("{name}.png")]
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    async fn stock_of(&self, product_id: i64) -> i64 {
        let (status, body) = self
            .send("GET", &format!("/products/{product_id}"), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        body["stock"].as_i64().unwrap()
    }

    async fn place_order(&self, product_id: i64, quantity: u32) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/orders",
            Some(USER),
            Some(json!({
                "items": [{ "product_id": product_id, "quantity": quantity }],
                "address": "1 Main St",
                "phone": "555-0100"
            })),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let h = TestHarness::new();

    let (status, body) = h.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["pending_tasks"].is_u64());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = TestHarness::new();

    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_product_crud_and_listing() {
    let h = TestHarness::new();
    let kettle = h.add_product("Kettle", 2500, 10).await;
    h.add_product("Toaster", 4000, 3).await;

    let (status, body) = h
        .send("GET", "/products?sort_by=price&order=asc", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["products"][0]["name"], "Kettle");

    let (status, body) = h
        .send(
            "PUT",
            &format!("/products/{kettle}"),
            None,
            Some(json!({ "name": "Kettle Pro", "price": 3000, "stock": 999, "category": "kitchen" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Kettle Pro");
    assert_eq!(body["stock"], 10);

    let (status, body) = h.send("GET", "/products/search?keyword=pro", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, _) = h.send("GET", "/products/999", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stock_update_is_guarded() {
    let h = TestHarness::new();
    let kettle = h.add_product("Kettle", 2500, 2).await;

    let (status, _) = h
        .send_internal(
            "PUT",
            &format!("/products/{kettle}/stock"),
            Some(json!({ "delta": -3 })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(h.stock_of(kettle).await, 2);

    let (status, body) = h
        .send_internal(
            "POST",
            &format!("/products/{kettle}/sales"),
            Some(json!({ "quantity": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sales"], 2);

    let (status, body) = h
        .send(
            "POST",
            "/products/stock/check",
            None,
            Some(json!({ "items": [
                { "product_id": kettle, "required": 2 },
                { "product_id": 999, "required": 1 }
            ] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], false);
    assert_eq!(body["items"][0]["available"], true);
    assert_eq!(body["items"][1]["available_stock"], 0);
}

#[tokio::test]
async fn test_cart_requires_caller() {
    let h = TestHarness::new();

    let (status, body) = h.send("GET", "/cart", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("X-User-Id"));
}

#[tokio::test]
async fn test_cart_add_update_remove() {
    let h = TestHarness::new();
    let kettle = h.add_product("Kettle", 2500, 10).await;

    let add = json!({ "product_id": kettle, "quantity": 2 });
    h.send("POST", "/cart/items", Some(USER), Some(add.clone())).await;
    let (status, body) = h.send("POST", "/cart/items", Some(USER), Some(add)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["quantity"], 4);

    let (_, cart) = h.send("GET", "/cart", Some(USER), None).await;
    assert_eq!(cart["total_count"], 4);
    assert_eq!(cart["total_price"], 10_000);
    assert_eq!(cart["items"][0]["stock"], 10);

    let (status, _) = h
        .send(
            "PUT",
            &format!("/cart/items/{kettle}"),
            Some(USER),
            Some(json!({ "quantity": 100 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
        .send("DELETE", &format!("/cart/items/{kettle}"), Some(USER), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = h
        .send("DELETE", &format!("/cart/items/{kettle}"), Some(USER), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_order_pay_flow() {
    let h = TestHarness::new();
    let kettle = h.add_product("Kettle", 2500, 10).await;
    h.send(
        "POST",
        "/cart/items",
        Some(USER),
        Some(json!({ "product_id": kettle, "quantity": 2 })),
    )
    .await;

    let (status, created) = h.place_order(kettle, 2).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["total_amount"], 5000);
    let order_id = created["order_id"].as_i64().unwrap();
    let order_no = created["order_no"].as_str().unwrap().to_string();
    assert!(order_no.starts_with("LG"));
    assert_eq!(h.stock_of(kettle).await, 8);

    h.state.tasks.wait_idle().await;
    let (_, cart) = h.send("GET", "/cart", Some(USER), None).await;
    assert_eq!(cart["total_count"], 0);

    let (status, created_payment) = h
        .send(
            "POST",
            "/payments",
            Some(USER),
            Some(json!({ "order_id": order_id, "amount": 5000, "payment_type": "alipay" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let payment_no = created_payment["payment"]["payment_no"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(
        created_payment["pay_url"]
            .as_str()
            .unwrap()
            .ends_with(&payment_no)
    );

    let callback = json!({
        "payment_no": payment_no,
        "order_id": order_id,
        "status": 2,
        "amount": 5000,
        "trade_no": "T-1001"
    });
    let (status, first) = h
        .send("POST", "/payments/callback", None, Some(callback.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["message"], "ok");
    let (status, second) = h
        .send("POST", "/payments/callback", None, Some(callback))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["message"], "payment already processed");

    let (_, order) = h
        .send("GET", &format!("/orders/no/{order_no}"), Some(USER), None)
        .await;
    assert_eq!(order["status"], "paid");

    let (status, cancel) = h
        .send("POST", &format!("/orders/{order_id}/cancel"), Some(USER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancel["success"], false);
    assert_eq!(h.stock_of(kettle).await, 8);

    let (_, payment) = h
        .send("GET", &format!("/payments/order/{order_id}"), Some(USER), None)
        .await;
    assert_eq!(payment["status"], "success");

    h.state.tasks.wait_idle().await;
    assert_eq!(h.publisher.published_to(Topic::OrderCreated).len(), 1);
    assert_eq!(h.publisher.published_to(Topic::PaymentSuccess).len(), 1);
}

#[tokio::test]
async fn test_cancel_restores_stock() {
    let h = TestHarness::new();
    let kettle = h.add_product("Kettle", 2500, 5).await;

    let (_, created) = h.place_order(kettle, 3).await;
    let order_id = created["order_id"].as_i64().unwrap();
    assert_eq!(h.stock_of(kettle).await, 2);

    let (status, stranger) = h
        .send("POST", &format!("/orders/{order_id}/cancel"), Some("8"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stranger["success"], false);
    assert_eq!(h.stock_of(kettle).await, 2);

    let (status, cancel) = h
        .send("POST", &format!("/orders/{order_id}/cancel"), Some(USER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancel["success"], true);
    assert_eq!(h.stock_of(kettle).await, 5);

    let (_, order) = h
        .send("GET", &format!("/orders/{order_id}"), Some(USER), None)
        .await;
    assert_eq!(order["status"], "cancelled");
}

#[tokio::test]
async fn test_order_errors_map_to_statuses() {
    let h = TestHarness::new();
    let kettle = h.add_product("Kettle", 2500, 1).await;

    let (status, _) = h.place_order(kettle, 2).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(h.stock_of(kettle).await, 1);

    let (status, _) = h.place_order(999, 1).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h.place_order(kettle, 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h.send("GET", "/orders/42", Some(USER), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payment_amount_must_match_order() {
    let h = TestHarness::new();
    let kettle = h.add_product("Kettle", 2500, 5).await;
    let (_, created) = h.place_order(kettle, 1).await;

    let (status, _) = h
        .send(
            "POST",
            "/payments",
            Some(USER),
            Some(json!({
                "order_id": created["order_id"],
                "amount": 100,
                "payment_type": "wechat"
            })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_status_updates_move_forward_only() {
    let h = TestHarness::new();
    let kettle = h.add_product("Kettle", 2500, 5).await;
    let (_, created) = h.place_order(kettle, 1).await;
    let uri = format!("/orders/{}/status", created["order_id"]);

    let (status, _) = h
        .send_internal("PUT", &uri, Some(json!({ "status": "shipped" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = h
        .send_internal("PUT", &uri, Some(json!({ "status": "paid" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paid");

    let (status, _) = h
        .send_internal("PUT", &uri, Some(json!({ "status": "cancelled" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_collaborator_operations_are_not_public() {
    let h = TestHarness::new();
    let kettle = h.add_product("Kettle", 2500, 5).await;
    let (_, created) = h.place_order(kettle, 1).await;
    let order_id = created["order_id"].as_i64().unwrap();

    let (status, _) = h
        .send(
            "PUT",
            &format!("/orders/{order_id}/status"),
            Some(USER),
            Some(json!({ "status": "paid" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h
        .send(
            "PUT",
            &format!("/products/{kettle}/stock"),
            Some(USER),
            Some(json!({ "delta": 100 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h
        .send(
            "POST",
            &format!("/products/{kettle}/sales"),
            Some(USER),
            Some(json!({ "quantity": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, order) = h
        .send("GET", &format!("/orders/{order_id}"), Some(USER), None)
        .await;
    assert_eq!(order["status"], "pending");
    assert_eq!(h.stock_of(kettle).await, 4);
}

#[tokio::test]
async fn test_list_orders_filters_by_status() {
    let h = TestHarness::new();
    let kettle = h.add_product("Kettle", 2500, 10).await;
    h.place_order(kettle, 1).await;
    let (_, second) = h.place_order(kettle, 1).await;
    h.send(
        "POST",
        &format!("/orders/{}/cancel", second["order_id"]),
        Some(USER),
        None,
    )
    .await;

    let (status, page) = h
        .send("GET", "/orders?status=pending", Some(USER), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);

    let (_, page) = h.send("GET", "/orders", Some("8"), None).await;
    assert_eq!(page["total"], 0);
}
