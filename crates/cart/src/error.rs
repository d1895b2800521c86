use common::ProductId;
use thiserror::Error;

/// Errors that can occur in cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("{0}")]
    Validation(String),

    #[error("Cart is full, maximum {max_items} items allowed")]
    CartFull { max_items: usize },

    #[error("Quantity limit exceeded, maximum {max} per item")]
    QuantityLimitExceeded { max: u32 },

    #[error("Cart item not found: {0}")]
    ItemNotFound(ProductId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Product service error: {0}")]
    Catalog(String),

    #[error("Cart store unavailable: {0}")]
    Unavailable(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CartError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        CartError::Validation(message.into())
    }
}

/// Result type for cart operations.
pub type Result<T> = std::result::Result<T, CartError>;
