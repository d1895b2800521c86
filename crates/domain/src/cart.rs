//! Cart item snapshot.

use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

/// One product in a user's cart.
///
/// Name, price and image are copied from the catalog when the product is
/// first added and are not refreshed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    pub image: String,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Returns price × quantity, or `None` if it does not fit in cents.
    pub fn subtotal(&self) -> Option<Money> {
        self.price.checked_mul(self.quantity)
    }
}
