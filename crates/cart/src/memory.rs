use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use common::{ProductId, UserId};
use domain::CartItem;
use tokio::sync::Mutex;

use crate::config::CartConfig;
use crate::error::{CartError, Result};
use crate::store::CartStore;

#[derive(Debug)]
struct StoredCart {
    lines: BTreeMap<ProductId, CartItem>,
    expires_at: Instant,
}

impl StoredCart {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory cart store for testing and single-process runs.
///
/// One mutex guards every cart, so each operation is a single
/// read-modify-write step just like a server-side script.
#[derive(Debug, Clone)]
pub struct InMemoryCartStore {
    carts: Arc<Mutex<HashMap<UserId, StoredCart>>>,
    config: CartConfig,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCartStore {
    /// Creates a new empty store enforcing the given limits.
    pub fn new(config: CartConfig) -> Self {
        Self {
            carts: Arc::new(Mutex::new(HashMap::new())),
            config,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every operation fail, as if the store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the quantity of one line, if present.
    pub async fn quantity_of(&self, user_id: UserId, product_id: ProductId) -> Option<u32> {
        let carts = self.carts.lock().await;
        carts
            .get(&user_id)
            .filter(|c| !c.is_expired())
            .and_then(|c| c.lines.get(&product_id))
            .map(|line| line.quantity)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CartError::Unavailable("cart store is down".to_string()));
        }
        Ok(())
    }

    fn live_cart<'a>(
        &self,
        carts: &'a mut HashMap<UserId, StoredCart>,
        user_id: UserId,
    ) -> &'a mut StoredCart {
        let expires_at = Instant::now() + self.config.expire;
        let cart = carts.entry(user_id).or_insert_with(|| StoredCart {
            lines: BTreeMap::new(),
            expires_at,
        });
        if cart.is_expired() {
            cart.lines.clear();
        }
        cart
    }
}

impl Default for InMemoryCartStore {
    fn default() -> Self {
        Self::new(CartConfig::default())
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn add_item(&self, user_id: UserId, item: CartItem) -> Result<u32> {
        self.check_available()?;
        let mut carts = self.carts.lock().await;
        let cart = self.live_cart(&mut carts, user_id);

        let current = match cart.lines.get(&item.product_id) {
            Some(line) => line.quantity,
            None if cart.lines.len() >= self.config.max_items => {
                return Err(CartError::CartFull {
                    max_items: self.config.max_items,
                });
            }
            None => 0,
        };

        let quantity = current + item.quantity;
        if quantity > self.config.max_quantity_per_item {
            return Err(CartError::QuantityLimitExceeded {
                max: self.config.max_quantity_per_item,
            });
        }

        cart.lines
            .entry(item.product_id)
            .and_modify(|line| line.quantity = quantity)
            .or_insert(item);
        cart.expires_at = Instant::now() + self.config.expire;
        Ok(quantity)
    }

    async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<u32> {
        self.check_available()?;
        let mut carts = self.carts.lock().await;
        let cart = self.live_cart(&mut carts, user_id);

        let Some(line) = cart.lines.get_mut(&product_id) else {
            return Err(CartError::ItemNotFound(product_id));
        };
        if quantity > self.config.max_quantity_per_item {
            return Err(CartError::QuantityLimitExceeded {
                max: self.config.max_quantity_per_item,
            });
        }
        line.quantity = quantity;
        cart.expires_at = Instant::now() + self.config.expire;
        Ok(quantity)
    }

    async fn remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        self.check_available()?;
        let mut carts = self.carts.lock().await;
        let cart = self.live_cart(&mut carts, user_id);
        Ok(cart.lines.remove(&product_id).is_some())
    }

    async fn clear(&self, user_id: UserId) -> Result<()> {
        self.check_available()?;
        self.carts.lock().await.remove(&user_id);
        Ok(())
    }

    async fn items(&self, user_id: UserId) -> Result<Vec<CartItem>> {
        self.check_available()?;
        let carts = self.carts.lock().await;
        Ok(carts
            .get(&user_id)
            .filter(|c| !c.is_expired())
            .map(|c| c.lines.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn touch(&self, user_id: UserId) -> Result<()> {
        self.check_available()?;
        let mut carts = self.carts.lock().await;
        if let Some(cart) = carts.get_mut(&user_id)
            && !cart.is_expired()
        {
            cart.expires_at = Instant::now() + self.config.expire;
        }
        Ok(())
    }
}
