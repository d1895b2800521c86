//! Order service error types.

use common::{OrderId, ProductId};
use domain::DomainError;
use thiserror::Error;

use crate::outbox::IntentState;

/// Errors that can occur in order operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The order does not exist or belongs to someone else.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// No order carries this order number for the caller.
    #[error("Order not found: {0}")]
    OrderNumberNotFound(String),

    /// A requested product does not exist or is not on sale.
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    /// The stock ledger refused the deduction.
    #[error("Insufficient stock for product {0}")]
    InsufficientStock(ProductId),

    /// The product service failed for another reason.
    #[error("Product service error: {0}")]
    ProductService(String),

    /// The cart service failed.
    #[error("Cart service error: {0}")]
    CartService(String),

    /// The order could not be persisted; any stock taken was handed back or
    /// queued for reconciliation.
    #[error("Failed to create order: {0}")]
    OrderNotPersisted(String),

    /// The stock intent table does not allow this transition.
    #[error("Invalid stock intent transition: {from} -> {to}")]
    InvalidIntentTransition { from: IntentState, to: IntentState },

    /// Domain error.
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Storage failure outside the database driver (for example, injected
    /// by the in-memory stores).
    #[error("Store error: {0}")]
    Store(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for order results.
pub type Result<T> = std::result::Result<T, SagaError>;
