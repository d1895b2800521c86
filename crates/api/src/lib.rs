//! HTTP gateway for the storefront services.
//!
//! Routes requests to the catalog, cart, order and payment services, applies
//! a request-wide deadline, and exposes structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::routing::{get, post, put};
use axum::{BoxError, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use error::ApiError;
use state::{AppState, Backend};

async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        metrics::counter!("http_request_timeouts_total").increment(1);
        tracing::warn!("request exceeded deadline");
        ApiError::Timeout
    } else {
        ApiError::Internal(err.to_string())
    }
}

/// Creates the Axum application router with all routes and shared state.
///
/// Every request, `/metrics` included, is cut off after `request_timeout`.
/// Dropping a handler cancels whatever it was awaiting; effects that already
/// committed stay committed.
pub fn create_app<B: Backend>(
    state: Arc<AppState<B>>,
    metrics_handle: PrometheusHandle,
    request_timeout: Duration,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<B>))
        // Products
        .route(
            "/products",
            get(routes::products::list::<B>).post(routes::products::create::<B>),
        )
        .route("/products/search", get(routes::products::search::<B>))
        .route(
            "/products/stock/check",
            post(routes::products::check_stock::<B>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<B>).put(routes::products::update::<B>),
        )
        // Cart
        .route(
            "/cart",
            get(routes::cart::get::<B>).delete(routes::cart::clear::<B>),
        )
        .route("/cart/items", post(routes::cart::add_item::<B>))
        .route(
            "/cart/items/{product_id}",
            put(routes::cart::update_item::<B>).delete(routes::cart::remove_item::<B>),
        )
        // Orders
        .route(
            "/orders",
            get(routes::orders::list::<B>).post(routes::orders::create::<B>),
        )
        .route("/orders/no/{order_no}", get(routes::orders::get_by_no::<B>))
        .route("/orders/{id}", get(routes::orders::get::<B>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<B>))
        // Payments
        .route("/payments", post(routes::payments::create::<B>))
        .route("/payments/callback", post(routes::payments::callback::<B>))
        .route("/payments/{id}", get(routes::payments::get::<B>))
        .route(
            "/payments/{id}/cancel",
            post(routes::payments::cancel::<B>),
        )
        .route(
            "/payments/order/{order_id}",
            get(routes::payments::get_by_order::<B>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the router for calls only other services may make: order status
/// changes and direct stock and sales adjustments.
///
/// Served on its own listener, never merged into the public router.
pub fn create_internal_app<B: Backend>(
    state: Arc<AppState<B>>,
    request_timeout: Duration,
) -> Router {
    Router::new()
        .route(
            "/orders/{id}/status",
            put(routes::orders::update_status::<B>),
        )
        .route(
            "/products/{id}/stock",
            put(routes::products::update_stock::<B>),
        )
        .route(
            "/products/{id}/sales",
            post(routes::products::increment_sales::<B>),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .layer(TraceLayer::new_for_http())
}

/// Runs the stock reconciler every `every` until `shutdown` resolves.
pub fn spawn_reconciler<B: Backend>(
    state: &AppState<B>,
    every: Duration,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    let reconciler = state.reconciler.clone();
    tokio::spawn(async move { reconciler.run(every, shutdown).await })
}
