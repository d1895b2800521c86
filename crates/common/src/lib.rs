//! Shared types for the order platform.
//!
//! Identifier newtypes keep user, product, order and payment ids from being
//! mixed up across service boundaries. [`Money`] carries every amount in
//! integer cents, and [`NumberGenerator`] produces the human-facing order and
//! payment numbers.

pub mod money;
pub mod number;
pub mod types;

pub use money::Money;
pub use number::{NumberGenerator, ORDER_NUMBERS, PAYMENT_NUMBERS};
pub use types::{OrderId, PaymentId, ProductId, UserId};
