//! Catalog and stock ledger endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use catalog::{ListQuery, ProductPage, SalesLevel, SearchQuery, SortField, SortOrder};
use common::ProductId;
use domain::{NewProduct, Product, StockCheck, StockDelta, StockLevel, StockRequirement};
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::{AppState, Backend};

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
    pub category: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_size: u32,
}

#[derive(Deserialize)]
pub struct CheckStockRequest {
    pub items: Vec<StockRequirement>,
}

#[derive(Deserialize)]
pub struct StockUpdateRequest {
    pub delta: i64,
}

#[derive(Deserialize)]
pub struct SalesRequest {
    pub quantity: i64,
}

/// GET /products
#[tracing::instrument(skip(state, params))]
pub async fn list<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<ProductPage>, ApiError> {
    let query = ListQuery {
        page: params.page,
        page_size: params.page_size,
        category: params.category,
        sort_by: params
            .sort_by
            .as_deref()
            .map(SortField::parse_lenient)
            .unwrap_or_default(),
        order: params
            .order
            .as_deref()
            .map(SortOrder::parse_lenient)
            .unwrap_or_default(),
    };
    Ok(Json(state.products.list_products(query).await?))
}

/// GET /products/search
#[tracing::instrument(skip(state, params))]
pub async fn search<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ProductPage>, ApiError> {
    let query = SearchQuery {
        keyword: params.keyword,
        page: params.page,
        page_size: params.page_size,
    };
    Ok(Json(state.products.search_products(query).await?))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.products.get_product(ProductId::new(id)).await?))
}

/// POST /products
#[tracing::instrument(skip(state, product))]
pub async fn create<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(product): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.products.add_product(product).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /products/{id}: edit descriptive fields; stock and sales are kept.
#[tracing::instrument(skip(state, fields))]
pub async fn update<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<i64>,
    Json(fields): Json<NewProduct>,
) -> Result<Json<Product>, ApiError> {
    let product = state
        .products
        .update_product(ProductId::new(id), fields)
        .await?;
    Ok(Json(product))
}

/// PUT /products/{id}/stock on the internal listener: apply one guarded delta.
#[tracing::instrument(skip(state, req))]
pub async fn update_stock<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<i64>,
    Json(req): Json<StockUpdateRequest>,
) -> Result<Json<StockLevel>, ApiError> {
    let level = state
        .products
        .update_stock(StockDelta::new(ProductId::new(id), req.delta))
        .await?;
    Ok(Json(level))
}

/// POST /products/{id}/sales on the internal listener.
#[tracing::instrument(skip(state, req))]
pub async fn increment_sales<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Path(id): Path<i64>,
    Json(req): Json<SalesRequest>,
) -> Result<Json<SalesLevel>, ApiError> {
    let level = state
        .products
        .increment_sales(ProductId::new(id), req.quantity)
        .await?;
    Ok(Json(level))
}

/// POST /products/stock/check: advisory availability of several products.
#[tracing::instrument(skip(state, req))]
pub async fn check_stock<B: Backend>(
    State(state): State<Arc<AppState<B>>>,
    Json(req): Json<CheckStockRequest>,
) -> Result<Json<StockCheck>, ApiError> {
    Ok(Json(state.products.check_stock(&req.items).await?))
}
