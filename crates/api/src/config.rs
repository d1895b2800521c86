//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use cart::CartConfig;
use catalog::CacheConfig;
use payment::PaymentConfig;
use thiserror::Error;

/// Configuration that cannot be used as given.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// One backend URL was set without the other.
    #[error("{set} is set but {missing} is not; both are needed for persistent storage")]
    IncompleteStorage {
        set: &'static str,
        missing: &'static str,
    },
}

/// Where the services keep their state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// Everything in process memory; lost on restart.
    InMemory,
    /// PostgreSQL for products, orders and payments, Redis for cache and carts.
    Persistent {
        database_url: String,
        redis_url: String,
    },
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT` (default `0.0.0.0:3000`)
/// - `INTERNAL_HOST`, `INTERNAL_PORT` (default `127.0.0.1:3001`), the
///   listener for collaborator-only calls
/// - `RUST_LOG` (default `info`)
/// - `REQUEST_TIMEOUT_SECS` (default 10)
/// - `DATABASE_URL`, `REDIS_URL` (optional, together)
/// - `CART_EXPIRE_SECS`, `CART_MAX_ITEMS`, `CART_MAX_QUANTITY_PER_ITEM`
/// - `CACHE_PRODUCT_TTL_SECS`, `CACHE_LIST_TTL_SECS`, `CACHE_SEARCH_TTL_SECS`
/// - `RECONCILE_INTERVAL_SECS` (default 60)
/// - `PAYMENT_MOCK_GATEWAY` (default true)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub internal_host: String,
    pub internal_port: u16,
    pub log_level: String,
    pub request_timeout: Duration,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub cart: CartConfig,
    pub cache: CacheConfig,
    pub reconcile_interval: Duration,
    pub payment: PaymentConfig,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or(name, default.as_secs()))
}

fn env_url(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_or("PORT", defaults.port),
            internal_host: std::env::var("INTERNAL_HOST").unwrap_or(defaults.internal_host),
            internal_port: env_or("INTERNAL_PORT", defaults.internal_port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            request_timeout: env_secs("REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            database_url: env_url("DATABASE_URL"),
            redis_url: env_url("REDIS_URL"),
            cart: CartConfig {
                expire: env_secs("CART_EXPIRE_SECS", defaults.cart.expire),
                max_items: env_or("CART_MAX_ITEMS", defaults.cart.max_items),
                max_quantity_per_item: env_or(
                    "CART_MAX_QUANTITY_PER_ITEM",
                    defaults.cart.max_quantity_per_item,
                ),
            },
            cache: CacheConfig {
                product_ttl: env_secs("CACHE_PRODUCT_TTL_SECS", defaults.cache.product_ttl),
                list_ttl: env_secs("CACHE_LIST_TTL_SECS", defaults.cache.list_ttl),
                search_ttl: env_secs("CACHE_SEARCH_TTL_SECS", defaults.cache.search_ttl),
                ..defaults.cache
            },
            reconcile_interval: env_secs("RECONCILE_INTERVAL_SECS", defaults.reconcile_interval),
            payment: PaymentConfig {
                mock_gateway: env_or("PAYMENT_MOCK_GATEWAY", defaults.payment.mock_gateway),
                ..defaults.payment
            },
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the bind address of the internal listener.
    pub fn internal_addr(&self) -> String {
        format!("{}:{}", self.internal_host, self.internal_port)
    }

    /// Picks the storage backends from the configured URLs.
    pub fn storage(&self) -> Result<Storage, ConfigError> {
        match (&self.database_url, &self.redis_url) {
            (Some(database_url), Some(redis_url)) => Ok(Storage::Persistent {
                database_url: database_url.clone(),
                redis_url: redis_url.clone(),
            }),
            (None, None) => Ok(Storage::InMemory),
            (Some(_), None) => Err(ConfigError::IncompleteStorage {
                set: "DATABASE_URL",
                missing: "REDIS_URL",
            }),
            (None, Some(_)) => Err(ConfigError::IncompleteStorage {
                set: "REDIS_URL",
                missing: "DATABASE_URL",
            }),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            internal_host: "127.0.0.1".to_string(),
            internal_port: 3001,
            log_level: "info".to_string(),
            request_timeout: Duration::from_secs(10),
            database_url: None,
            redis_url: None,
            cart: CartConfig::default(),
            cache: CacheConfig::default(),
            reconcile_interval: Duration::from_secs(60),
            payment: PaymentConfig::default(),
        }
    }
}
