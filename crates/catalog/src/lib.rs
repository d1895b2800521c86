//! Product catalog and stock ledger.
//!
//! Stock only changes through conditional updates (`stock + delta >= 0`), and
//! a batch of updates is all-or-nothing. Reads are served cache-aside:
//! product details are evicted on mutation, while list and search results are
//! keyed by version counters that mutations bump.

pub mod cache;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod service;
pub mod store;

pub use cache::{CacheBackend, CacheConfig, CacheError, InMemoryCache, RedisCache};
pub use error::{CatalogError, Result};
pub use memory::InMemoryProductStore;
pub use postgres::PostgresProductStore;
pub use service::ProductService;
pub use store::{ListQuery, ProductPage, ProductStore, SalesLevel, SearchQuery, SortField, SortOrder};
