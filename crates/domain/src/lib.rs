//! Domain layer for the order platform.
//!
//! Plain data and state machines shared by the services:
//! - [`Order`] with its [`OrderStatus`] transition table
//! - [`Payment`] with [`PaymentStatus`] and [`PaymentType`]
//! - [`Product`] and the stock ledger value types
//! - [`CartItem`] snapshots
//!
//! Nothing here performs I/O.

pub mod cart;
pub mod error;
pub mod order;
pub mod payment;
pub mod product;

pub use cart::CartItem;
pub use error::DomainError;
pub use order::{
    CreateOrder, MAX_LINE_QUANTITY, NewOrder, Order, OrderItem, OrderLine, OrderStatus,
    UpdateOrderStatus,
};
pub use payment::{CreatePayment, NewPayment, Payment, PaymentCallback, PaymentStatus, PaymentType};
pub use product::{
    NewProduct, Product, ProductStatus, StockAvailability, StockCheck, StockDelta, StockLevel,
    StockRequirement,
};
