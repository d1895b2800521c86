//! Order placement, cancellation and status endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId};
use domain::{CreateOrder, Order, OrderLine, OrderStatus, UpdateOrderStatus};
use saga::{CancelOutcome, CreateOrderResult, OrderPage, OrderQuery};
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::{AppState, Backend};

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineRequest>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub remark: String,
}

#[derive(Deserialize)]
pub struct OrderLineRequest {
    pub product_id: i64,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub operated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct ListOrdersParams {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    pub status: Option<OrderStatus>,
}

// -- Handlers --

/// POST /orders: place an order for the caller.
#[tracing::instrument(skip(state, req))]
pub async fn create<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResult>), ApiError> {
    let lines = req
        .items
        .iter()
        .map(|line| OrderLine::new(ProductId::new(line.product_id), line.quantity))
        .collect();
    let cmd = CreateOrder::new(user_id, lines)
        .with_contact(req.address, req.phone)
        .with_remark(req.remark);

    let created = state.orders.create_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /orders: page through the caller's orders.
#[tracing::instrument(skip(state, params))]
pub async fn list<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Query(params): Query<ListOrdersParams>,
) -> Result<Json<OrderPage>, ApiError> {
    let query = OrderQuery {
        user_id,
        page: params.page,
        page_size: params.page_size,
        status: params.status,
    };
    Ok(Json(state.orders.list_orders(query).await?))
}

/// GET /orders/{id}: one of the caller's orders.
#[tracing::instrument(skip(state))]
pub async fn get<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Path(id): Path<i64>,
) -> Result<Json<Order>, ApiError> {
    let order = state.orders.get_order(OrderId::new(id), user_id).await?;
    Ok(Json(order))
}

/// GET /orders/no/{order_no}: look an order up by its business number.
#[tracing::instrument(skip(state))]
pub async fn get_by_no<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Path(order_no): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order = state.orders.get_order_by_no(&order_no, user_id).await?;
    Ok(Json(order))
}

/// POST /orders/{id}/cancel: cancel a pending order and hand its stock back.
///
/// A refusal is a normal response with `success: false`.
#[tracing::instrument(skip(state))]
pub async fn cancel<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Path(id): Path<i64>,
) -> Result<Json<CancelOutcome>, ApiError> {
    let outcome = state.orders.cancel_order(OrderId::new(id), user_id).await?;
    Ok(Json(outcome))
}

/// PUT /orders/{id}/status on the internal listener: move an order forward
/// (paid, shipped, completed).
#[tracing::instrument(skip(state, req))]
pub async fn update_status<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let mut cmd = UpdateOrderStatus::new(OrderId::new(id), req.status);
    if let Some(at) = req.operated_at {
        cmd = cmd.at(at);
    }
    Ok(Json(state.orders.update_order_status(cmd).await?))
}
