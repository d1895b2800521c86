use chrono::Utc;
use common::{Money, ProductId, UserId};
use domain::CartItem;
use serde::{Deserialize, Serialize};

use crate::catalog_client::ProductCatalog;
use crate::config::CartConfig;
use crate::error::{CartError, Result};
use crate::store::CartStore;

/// A cart line with advisory stock information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    /// Stock at read time; zero when unknown.
    pub stock: i64,
    pub available: bool,
}

/// A user's cart as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartLine>,
    pub total_price: Money,
    pub total_count: u32,
}

/// Service for cart operations.
pub struct CartService<S, P> {
    store: S,
    catalog: P,
    config: CartConfig,
}

impl<S: CartStore, P: ProductCatalog> CartService<S, P> {
    /// Creates a new cart service.
    pub fn new(store: S, catalog: P, config: CartConfig) -> Self {
        Self {
            store,
            catalog,
            config,
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds units of a product, snapshotting its name, price and image.
    ///
    /// Returns the line's new quantity.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<u32> {
        validate_user(user_id)?;
        validate_product(product_id)?;
        if quantity == 0 {
            return Err(CartError::validation("Quantity must be greater than 0"));
        }
        if quantity > self.config.max_quantity_per_item {
            return Err(CartError::validation(format!(
                "Quantity cannot exceed {}",
                self.config.max_quantity_per_item
            )));
        }

        let product = self.catalog.get_product(product_id).await?;
        let item = CartItem {
            product_id,
            name: product.name.clone(),
            price: product.price,
            quantity,
            image: product.first_image().to_string(),
            added_at: Utc::now(),
        };

        match self.store.add_item(user_id, item).await {
            Ok(total) => {
                tracing::info!(%user_id, %product_id, quantity, total, "added to cart");
                metrics::counter!("cart_mutations_total", "op" => "add", "outcome" => "ok")
                    .increment(1);
                Ok(total)
            }
            Err(e) => {
                metrics::counter!("cart_mutations_total", "op" => "add", "outcome" => "rejected")
                    .increment(1);
                Err(e)
            }
        }
    }

    /// Replaces the quantity of a line already in the cart.
    #[tracing::instrument(skip(self))]
    pub async fn update_cart_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<u32> {
        validate_user(user_id)?;
        validate_product(product_id)?;
        if quantity == 0 || quantity > self.config.max_quantity_per_item {
            return Err(CartError::validation(format!(
                "Quantity must be between 1 and {}",
                self.config.max_quantity_per_item
            )));
        }

        let quantity = self.store.set_quantity(user_id, product_id, quantity).await?;
        tracing::info!(%user_id, %product_id, quantity, "cart item updated");
        Ok(quantity)
    }

    /// Removes one line.
    #[tracing::instrument(skip(self))]
    pub async fn remove_cart_item(&self, user_id: UserId, product_id: ProductId) -> Result<()> {
        validate_user(user_id)?;
        validate_product(product_id)?;

        if !self.store.remove_item(user_id, product_id).await? {
            return Err(CartError::ItemNotFound(product_id));
        }
        tracing::info!(%user_id, %product_id, "cart item removed");
        Ok(())
    }

    /// Empties the cart.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        validate_user(user_id)?;
        self.store.clear(user_id).await?;
        tracing::info!(%user_id, "cart cleared");
        Ok(())
    }

    /// Returns the cart with totals and current stock per line.
    ///
    /// A catalog failure leaves stock at zero and availability set; the cart
    /// itself is still returned.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        validate_user(user_id)?;

        let items = self.store.items(user_id).await?;
        if items.is_empty() {
            return Ok(Cart {
                items: Vec::new(),
                total_price: Money::zero(),
                total_count: 0,
            });
        }

        let total_price = items
            .iter()
            .map(CartItem::subtotal)
            .try_fold(Money::zero(), |total, subtotal| {
                subtotal.and_then(|s| total.checked_add(s))
            })
            .ok_or_else(|| CartError::validation("cart total is out of range"))?;
        let total_count = items
            .iter()
            .fold(0u32, |count, i| count.saturating_add(i.quantity));

        let ids: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
        let stock = match self.catalog.stock_levels(&ids).await {
            Ok(levels) => Some(levels),
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "stock enrichment failed");
                None
            }
        };

        let items = items
            .into_iter()
            .map(|item| {
                let (stock, available) = match &stock {
                    Some(levels) => {
                        let level = levels.get(&item.product_id).copied().unwrap_or(0);
                        (level, level > 0)
                    }
                    None => (0, true),
                };
                CartLine {
                    item,
                    stock,
                    available,
                }
            })
            .collect();

        if let Err(e) = self.store.touch(user_id).await {
            tracing::warn!(%user_id, error = %e, "cart expiry refresh failed");
        }

        Ok(Cart {
            items,
            total_price,
            total_count,
        })
    }
}

fn validate_user(user_id: UserId) -> Result<()> {
    if !user_id.is_valid() {
        return Err(CartError::validation("Invalid user ID"));
    }
    Ok(())
}

fn validate_product(product_id: ProductId) -> Result<()> {
    if !product_id.is_valid() {
        return Err(CartError::validation("Invalid product ID"));
    }
    Ok(())
}
