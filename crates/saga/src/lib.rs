//! Order service.
//!
//! Places orders across three stores that share no transaction: the local
//! order tables, the stock ledger and the cart. Creation is a saga with a
//! compensating stock restoration; every deduction is recorded in a
//! stock-intent outbox first, so a failed compensation or a crash mid-saga
//! leaves a row the [`StockReconciler`] can retry or report.

pub mod clients;
pub mod config;
pub mod error;
pub mod events;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod reconciler;
pub mod service;
pub mod store;

pub use clients::{
    CartClient, InMemoryCartClient, InMemoryProductClient, ProductClient, ProductSnapshot,
};
pub use config::SagaConfig;
pub use error::{Result, SagaError};
pub use events::{
    OrderCancelled, OrderCreated, OrderLineEvent, OrderStatusChanged, StockCompensationFailed,
    StockLineEvent,
};
pub use memory::{InMemoryIntentStore, InMemoryOrderStore, InMemoryOrderTx};
pub use outbox::{IntentState, StockIntent, StockIntentStore};
pub use postgres::{PostgresIntentStore, PostgresOrderStore, PostgresOrderTx};
pub use reconciler::{ReconcileReport, StockReconciler};
pub use service::{CancelOutcome, CreateOrderResult, OrderService};
pub use store::{OrderPage, OrderQuery, OrderStore, OrderTx};
