//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Input failed validation.
    #[error("Invalid parameter: {0}")]
    Validation(String),

    /// The order status table does not allow this transition.
    #[error("Invalid status transition: cannot move order from {from} to {to}")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    /// A status name or code that is not recognised.
    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    /// A payment type code that is not recognised.
    #[error("Unknown payment type: {0}")]
    UnknownPaymentType(i32),
}

impl DomainError {
    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }
}
