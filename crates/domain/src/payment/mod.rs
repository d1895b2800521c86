//! Payments and their resolution.

mod commands;
mod model;
mod state;

pub use commands::{CreatePayment, PaymentCallback};
pub use model::{NewPayment, Payment};
pub use state::{PaymentStatus, PaymentType};
