use std::sync::Arc;

use async_trait::async_trait;
use common::{ProductId, UserId};
use domain::CartItem;

use crate::error::Result;

/// Storage for per-user carts.
///
/// `add_item` and `set_quantity` must run as one atomic step per cart: two
/// concurrent calls for the same user observe each other's writes.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Adds `item.quantity` units of a product, creating the line if needed.
    ///
    /// An existing line keeps its snapshot and only gains quantity. Returns
    /// the line's new quantity.
    async fn add_item(&self, user_id: UserId, item: CartItem) -> Result<u32>;

    /// Replaces the quantity of an existing line.
    async fn set_quantity(&self, user_id: UserId, product_id: ProductId, quantity: u32)
    -> Result<u32>;

    /// Deletes one line. Returns false if it was not in the cart.
    async fn remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<bool>;

    /// Deletes the whole cart. Clearing an empty cart succeeds.
    async fn clear(&self, user_id: UserId) -> Result<()>;

    /// Returns every line, ordered by product id.
    async fn items(&self, user_id: UserId) -> Result<Vec<CartItem>>;

    /// Refreshes the cart's expiry.
    async fn touch(&self, user_id: UserId) -> Result<()>;
}

#[async_trait]
impl<T: CartStore + ?Sized> CartStore for Arc<T> {
    async fn add_item(&self, user_id: UserId, item: CartItem) -> Result<u32> {
        (**self).add_item(user_id, item).await
    }

    async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<u32> {
        (**self).set_quantity(user_id, product_id, quantity).await
    }

    async fn remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        (**self).remove_item(user_id, product_id).await
    }

    async fn clear(&self, user_id: UserId) -> Result<()> {
        (**self).clear(user_id).await
    }

    async fn items(&self, user_id: UserId) -> Result<Vec<CartItem>> {
        (**self).items(user_id).await
    }

    async fn touch(&self, user_id: UserId) -> Result<()> {
        (**self).touch(user_id).await
    }
}

/// Redis key of a user's cart hash.
pub fn cart_key(user_id: UserId) -> String {
    format!("cart:user:{user_id}")
}

/// Hash field of one product line.
pub fn product_field(product_id: ProductId) -> String {
    format!("product:{product_id}")
}
