//! Payment endpoints, including the gateway callback.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{Money, OrderId, PaymentId};
use domain::{CreatePayment, Payment, PaymentCallback, PaymentType};
use payment::{CallbackOutcome, CreatedPayment};
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::{AppState, Backend};

#[derive(Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: i64,
    pub amount: Money,
    pub payment_type: PaymentType,
}

/// POST /payments: open a payment for one of the caller's pending orders.
#[tracing::instrument(skip(state, req))]
pub async fn create<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<CreatedPayment>), ApiError> {
    let cmd = CreatePayment::new(
        OrderId::new(req.order_id),
        user_id,
        req.amount,
        req.payment_type,
    );
    let created = state.payments.create_payment(cmd).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /payments/callback: gateway notification. Safe to deliver twice.
#[tracing::instrument(skip(state, callback), fields(payment_no = %callback.payment_no))]
pub async fn callback<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(callback): Json<PaymentCallback>,
) -> Result<Json<CallbackOutcome>, ApiError> {
    Ok(Json(state.payments.handle_callback(callback).await?))
}

/// GET /payments/{id}
#[tracing::instrument(skip(state))]
pub async fn get<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state
        .payments
        .query_payment(PaymentId::new(id), user_id)
        .await?;
    Ok(Json(payment))
}

/// GET /payments/order/{order_id}
#[tracing::instrument(skip(state))]
pub async fn get_by_order<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Path(order_id): Path<i64>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state
        .payments
        .get_payment_by_order(OrderId::new(order_id), user_id)
        .await?;
    Ok(Json(payment))
}

/// POST /payments/{id}/cancel: drop a pending payment.
#[tracing::instrument(skip(state))]
pub async fn cancel<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, ApiError> {
    let payment = state
        .payments
        .cancel_payment(PaymentId::new(id), user_id)
        .await?;
    Ok(Json(payment))
}
