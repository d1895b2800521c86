use std::time::Duration;

/// Cart limits and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartConfig {
    /// Sliding expiry, refreshed by every mutation and read.
    pub expire: Duration,
    /// Maximum number of distinct products in one cart.
    pub max_items: usize,
    /// Maximum quantity of a single product.
    pub max_quantity_per_item: u32,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            expire: Duration::from_secs(7 * 24 * 3600),
            max_items: 100,
            max_quantity_per_item: 99,
        }
    }
}
