//! Cache key layout.
//!
//! List and search keys embed a version number. Bumping the version orphans
//! every result cached under the old number; orphans expire by TTL.

use common::ProductId;

use crate::store::{ListQuery, SearchQuery};

/// Version counter shared by every product.
pub const GLOBAL_VERSION: &str = "product:GlobalVersion";

pub fn detail(id: ProductId) -> String {
    format!("product:detail:{id}")
}

pub fn category_version(category: &str) -> String {
    format!("product:CategoryVersion:{category}")
}

/// Version counter a list query is keyed by: its category's, or the global
/// one for unfiltered lists.
pub fn list_version(query: &ListQuery) -> String {
    match &query.category {
        Some(category) => category_version(category),
        None => GLOBAL_VERSION.to_string(),
    }
}

pub fn list(version: i64, query: &ListQuery) -> String {
    format!(
        "product:list:v{version}:{}:{}:{}:{}:{}",
        query.page,
        query.page_size,
        query.category.as_deref().unwrap_or_default(),
        query.sort_by.as_str(),
        query.order.as_str()
    )
}

pub fn search(version: i64, query: &SearchQuery) -> String {
    format!(
        "product:search:v{version}:{}:{}:{}",
        query.keyword.to_lowercase(),
        query.page,
        query.page_size
    )
}
