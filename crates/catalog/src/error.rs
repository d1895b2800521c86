//! Catalog error types.

use common::ProductId;
use domain::DomainError;
use thiserror::Error;

use crate::cache::CacheError;

/// Errors that can occur in the product catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Input failed validation.
    #[error("Invalid parameter: {0}")]
    Validation(String),

    /// No active product with this id.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// A conditional stock update matched no row: the product is missing,
    /// inactive, or the delta would take stock below zero.
    #[error("Insufficient stock for product {product_id} (delta {delta})")]
    InsufficientStock { product_id: ProductId, delta: i64 },

    /// Domain rule violation.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Cache error. Only surfaced by the cache itself; the service degrades
    /// to the store instead.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for catalog results.
pub type Result<T> = std::result::Result<T, CatalogError>;
