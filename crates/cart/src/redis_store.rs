use std::collections::HashMap;

use async_trait::async_trait;
use common::{ProductId, UserId};
use domain::CartItem;
use redis::Script;
use redis::aio::ConnectionManager;

use crate::config::CartConfig;
use crate::error::{CartError, Result};
use crate::store::{CartStore, cart_key, product_field};

const CART_FULL: i64 = -1;
const QUANTITY_LIMIT_EXCEEDED: i64 = -2;
const ITEM_NOT_FOUND: i64 = -3;

// KEYS[1] cart, ARGV: field, add_qty, max_qty, max_items, item_json, expire_secs
const ADD_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
local item
if current then
    item = cjson.decode(current)
else
    if redis.call('HLEN', KEYS[1]) >= tonumber(ARGV[4]) then
        return -1
    end
    item = cjson.decode(ARGV[5])
    item.quantity = 0
end
local new_qty = item.quantity + tonumber(ARGV[2])
if new_qty > tonumber(ARGV[3]) then
    return -2
end
item.quantity = new_qty
redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(item))
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[6]))
return new_qty
"#;

// KEYS[1] cart, ARGV: field, new_qty, max_qty, expire_secs
const UPDATE_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if not current then
    return -3
end
local new_qty = tonumber(ARGV[2])
if new_qty > tonumber(ARGV[3]) then
    return -2
end
local item = cjson.decode(current)
item.quantity = new_qty
redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(item))
redis.call('EXPIRE', KEYS[1], tonumber(ARGV[4]))
return new_qty
"#;

/// Cart store on Redis hashes.
///
/// Add and update run as Lua scripts, which Redis executes one at a time, so
/// the read-check-write of each call is atomic.
#[derive(Clone)]
pub struct RedisCartStore {
    conn: ConnectionManager,
    config: CartConfig,
    add_script: Script,
    update_script: Script,
}

impl RedisCartStore {
    /// Connects to Redis.
    pub async fn connect(redis_url: &str, config: CartConfig) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_manager(conn, config))
    }

    /// Wraps an existing connection manager.
    pub fn from_manager(conn: ConnectionManager, config: CartConfig) -> Self {
        Self {
            conn,
            config,
            add_script: Script::new(ADD_SCRIPT),
            update_script: Script::new(UPDATE_SCRIPT),
        }
    }

    fn expire_secs(&self) -> u64 {
        self.config.expire.as_secs().max(1)
    }

    fn script_outcome(&self, code: i64, product_id: ProductId) -> Result<u32> {
        match code {
            CART_FULL => Err(CartError::CartFull {
                max_items: self.config.max_items,
            }),
            QUANTITY_LIMIT_EXCEEDED => Err(CartError::QuantityLimitExceeded {
                max: self.config.max_quantity_per_item,
            }),
            ITEM_NOT_FOUND => Err(CartError::ItemNotFound(product_id)),
            quantity => u32::try_from(quantity)
                .map_err(|_| CartError::Unavailable(format!("unexpected script reply {quantity}"))),
        }
    }
}

#[async_trait]
impl CartStore for RedisCartStore {
    async fn add_item(&self, user_id: UserId, item: CartItem) -> Result<u32> {
        let mut conn = self.conn.clone();
        let product_id = item.product_id;
        let payload = serde_json::to_string(&item)?;

        let code: i64 = self
            .add_script
            .key(cart_key(user_id))
            .arg(product_field(product_id))
            .arg(item.quantity)
            .arg(self.config.max_quantity_per_item)
            .arg(self.config.max_items)
            .arg(payload)
            .arg(self.expire_secs())
            .invoke_async(&mut conn)
            .await?;

        self.script_outcome(code, product_id)
    }

    async fn set_quantity(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<u32> {
        let mut conn = self.conn.clone();
        let code: i64 = self
            .update_script
            .key(cart_key(user_id))
            .arg(product_field(product_id))
            .arg(quantity)
            .arg(self.config.max_quantity_per_item)
            .arg(self.expire_secs())
            .invoke_async(&mut conn)
            .await?;

        self.script_outcome(code, product_id)
    }

    async fn remove_item(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let mut conn = self.conn.clone();
        let key = cart_key(user_id);
        let removed: i64 = redis::cmd("HDEL")
            .arg(&key)
            .arg(product_field(product_id))
            .query_async(&mut conn)
            .await?;
        if removed > 0 {
            let _: i64 = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(self.expire_secs())
                .query_async(&mut conn)
                .await?;
        }
        Ok(removed > 0)
    }

    async fn clear(&self, user_id: UserId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL")
            .arg(cart_key(user_id))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn items(&self, user_id: UserId) -> Result<Vec<CartItem>> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(cart_key(user_id))
            .query_async(&mut conn)
            .await?;

        let mut items = Vec::with_capacity(raw.len());
        for (field, value) in raw {
            match serde_json::from_str::<CartItem>(&value) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!(%user_id, field, error = %e, "skipping unreadable cart line"),
            }
        }
        items.sort_by_key(|item| item.product_id);
        Ok(items)
    }

    async fn touch(&self, user_id: UserId) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(cart_key(user_id))
            .arg(self.expire_secs())
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
