//! Payment service.
//!
//! Opens at most one live payment per pending order and applies gateway
//! callbacks exactly once. A successful payment moves its order to paid
//! through the [`OrderClient`]; if that call fails the payment is kept and
//! the failure is logged for reconciliation.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;

pub use client::{InMemoryOrderClient, OrderClient, OrderSummary};
pub use config::PaymentConfig;
pub use error::{PaymentError, Result};
pub use events::PaymentResolved;
pub use memory::InMemoryPaymentStore;
pub use postgres::PostgresPaymentStore;
pub use service::{CallbackOutcome, CreatedPayment, PaymentService};
pub use store::PaymentStore;
