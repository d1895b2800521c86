//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cart::CartError;
use catalog::CatalogError;
use domain::DomainError;
use payment::PaymentError;
use saga::SagaError;

const INTERNAL_MESSAGE: &str = "internal server error";

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// No usable caller identity.
    Unauthorized(String),
    /// The request ran past the deadline.
    Timeout,
    /// Internal server error.
    Internal(String),
    Catalog(CatalogError),
    Cart(CartError),
    Order(SagaError),
    Payment(PaymentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "request timeout".to_string()),
            ApiError::Internal(msg) => internal(msg),
            ApiError::Catalog(err) => catalog_error_to_response(err),
            ApiError::Cart(err) => cart_error_to_response(err),
            ApiError::Order(err) => order_error_to_response(err),
            ApiError::Payment(err) => payment_error_to_response(err),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn internal(detail: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!(error = %detail, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_MESSAGE.to_string(),
    )
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    match &err {
        DomainError::Validation(_)
        | DomainError::UnknownStatus(_)
        | DomainError::UnknownPaymentType(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        DomainError::InvalidStatusTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
    }
}

fn catalog_error_to_response(err: CatalogError) -> (StatusCode, String) {
    match err {
        CatalogError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        CatalogError::ProductNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        CatalogError::InsufficientStock { .. } => (StatusCode::CONFLICT, err.to_string()),
        CatalogError::Domain(err) => domain_error_to_response(err),
        other => internal(other),
    }
}

fn cart_error_to_response(err: CartError) -> (StatusCode, String) {
    match err {
        CartError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        CartError::ItemNotFound(_) | CartError::ProductNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        CartError::CartFull { .. } | CartError::QuantityLimitExceeded { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        other => internal(other),
    }
}

fn order_error_to_response(err: SagaError) -> (StatusCode, String) {
    match err {
        SagaError::OrderNotFound(_)
        | SagaError::OrderNumberNotFound(_)
        | SagaError::ProductNotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        SagaError::InsufficientStock(_) => (StatusCode::CONFLICT, err.to_string()),
        SagaError::Domain(err) => domain_error_to_response(err),
        other => internal(other),
    }
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, String) {
    match err {
        PaymentError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        PaymentError::OrderNotFound(_)
        | PaymentError::PaymentNotFound(_)
        | PaymentError::PaymentNumberNotFound(_)
        | PaymentError::NoPaymentForOrder(_) => (StatusCode::NOT_FOUND, err.to_string()),
        PaymentError::OrderNotPending { .. } | PaymentError::PaymentNotPending { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        PaymentError::AmountMismatch { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        }
        PaymentError::Domain(err) => domain_error_to_response(err),
        other => internal(other),
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        ApiError::Catalog(err)
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Order(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}
