//! Orders and their lifecycle.

mod commands;
mod model;
mod state;

pub use commands::{CreateOrder, MAX_LINE_QUANTITY, OrderLine, UpdateOrderStatus};
pub use model::{NewOrder, Order, OrderItem};
pub use state::OrderStatus;
