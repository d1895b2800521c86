use common::{Money, OrderId, PaymentId};
use domain::{DomainError, OrderStatus, PaymentStatus};
use thiserror::Error;

/// Errors that can occur in the payment service.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Request failed validation.
    #[error("{0}")]
    Validation(String),

    /// The order does not exist or belongs to someone else.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Only pending orders can be paid.
    #[error("Order {order_id} is {status}, only pending orders can be paid")]
    OrderNotPending {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// The amount differs from the amount on record.
    #[error("Amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: Money, actual: Money },

    /// Payment not found by id.
    #[error("Payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// Payment not found by payment number.
    #[error("Payment not found: {0}")]
    PaymentNumberNotFound(String),

    /// The order has no live payment.
    #[error("Payment not found for order {0}")]
    NoPaymentForOrder(OrderId),

    /// The payment has already been resolved or cancelled.
    #[error("Payment {payment_id} is {status} and cannot be cancelled")]
    PaymentNotPending {
        payment_id: PaymentId,
        status: PaymentStatus,
    },

    /// The order service failed.
    #[error("Order service error: {0}")]
    OrderService(String),

    /// Domain error.
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Storage failure outside the database driver.
    #[error("Store error: {0}")]
    Store(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
