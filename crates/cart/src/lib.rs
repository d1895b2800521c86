//! Shopping carts.
//!
//! Add and update are single atomic read-modify-write steps per user, so
//! concurrent requests can never push a cart past its item cap or a line past
//! its quantity cap. Remove and clear are plain deletes.

pub mod catalog_client;
pub mod config;
pub mod error;
pub mod memory;
pub mod redis_store;
pub mod service;
pub mod store;

pub use catalog_client::ProductCatalog;
pub use config::CartConfig;
pub use error::{CartError, Result};
pub use memory::InMemoryCartStore;
pub use redis_store::RedisCartStore;
pub use service::{Cart, CartLine, CartService};
pub use store::CartStore;
