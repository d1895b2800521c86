//! Cart endpoints. Every call acts on the caller's own cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use ::cart::Cart;
use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::{AppState, Backend};

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: i64,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct QuantityResponse {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// GET /cart
#[tracing::instrument(skip(state))]
pub async fn get<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
) -> Result<Json<Cart>, ApiError> {
    Ok(Json(state.carts.get_cart(user_id).await?))
}

/// POST /cart/items: add units; repeated adds accumulate.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<QuantityResponse>, ApiError> {
    let product_id = ProductId::new(req.product_id);
    let quantity = state
        .carts
        .add_to_cart(user_id, product_id, req.quantity)
        .await?;
    Ok(Json(QuantityResponse {
        product_id,
        quantity,
    }))
}

/// PUT /cart/items/{product_id}: replace a line's quantity.
#[tracing::instrument(skip(state, req))]
pub async fn update_item<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Path(product_id): Path<i64>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<QuantityResponse>, ApiError> {
    let product_id = ProductId::new(product_id);
    let quantity = state
        .carts
        .update_cart_item(user_id, product_id, req.quantity)
        .await?;
    Ok(Json(QuantityResponse {
        product_id,
        quantity,
    }))
}

/// DELETE /cart/items/{product_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
    Path(product_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .carts
        .remove_cart_item(user_id, ProductId::new(product_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /cart
#[tracing::instrument(skip(state))]
pub async fn clear<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Caller(user_id): Caller,
) -> Result<StatusCode, ApiError> {
    state.carts.clear_cart(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
