//! Product store trait and query types.

use std::collections::HashMap;

use async_trait::async_trait;
use common::ProductId;
use domain::{NewProduct, Product, StockDelta, StockLevel};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

/// Column a product list is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Price,
    #[default]
    CreatedAt,
    Sales,
}

impl SortField {
    /// Parses a client value; anything unrecognised sorts by creation time.
    pub fn parse_lenient(value: &str) -> Self {
        match value {
            "price" => SortField::Price,
            "sales" => SortField::Sales,
            _ => SortField::CreatedAt,
        }
    }

    /// Returns the column name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Price => "price",
            SortField::CreatedAt => "created_at",
            SortField::Sales => "sales",
        }
    }
}

/// Direction of a product list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Parses a client value; anything but `asc` is descending.
    pub fn parse_lenient(value: &str) -> Self {
        if value.eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }

    /// Returns the SQL keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

fn normalize_page(page: u32, page_size: u32) -> (u32, u32) {
    let page = page.max(1);
    let page_size = match page_size {
        0 => DEFAULT_PAGE_SIZE,
        n => n.min(MAX_PAGE_SIZE),
    };
    (page, page_size)
}

/// Paged listing of active products.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub category: Option<String>,
    pub sort_by: SortField,
    pub order: SortOrder,
}

impl ListQuery {
    /// Applies defaults: page 1, 10 per page, at most 100 per page.
    pub fn normalized(mut self) -> Self {
        (self.page, self.page_size) = normalize_page(self.page, self.page_size);
        self.category = self.category.filter(|c| !c.is_empty());
        self
    }

    /// Rows to skip.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

/// Keyword search over active products.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SearchQuery {
    pub keyword: String,
    pub page: u32,
    pub page_size: u32,
}

impl SearchQuery {
    /// Applies the same paging defaults as [`ListQuery`].
    pub fn normalized(mut self) -> Self {
        (self.page, self.page_size) = normalize_page(self.page, self.page_size);
        self.keyword = self.keyword.trim().to_string();
        self
    }

    /// Rows to skip.
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }
}

/// One page of products plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPage {
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub products: Vec<Product>,
}

/// Sales count of a product right after an increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesLevel {
    pub product_id: ProductId,
    pub sales: i64,
    pub category: String,
}

/// Persistence for products and the stock ledger.
///
/// Stock changes only through conditional updates; implementations never
/// overwrite stock wholesale.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Inserts a product and returns it with its assigned id.
    async fn insert(&self, product: NewProduct) -> Result<Product>;

    /// Replaces the editable fields of a product. Stock and sales are kept.
    ///
    /// Returns `None` when no product has this id.
    async fn update(&self, id: ProductId, product: NewProduct) -> Result<Option<Product>>;

    /// Loads a product regardless of status.
    async fn find(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists active products.
    async fn list(&self, query: &ListQuery) -> Result<ProductPage>;

    /// Searches active products by name or description, best sellers first.
    async fn search(&self, query: &SearchQuery) -> Result<ProductPage>;

    /// Applies every delta or none.
    ///
    /// Each delta is guarded by `stock + delta >= 0` on an active product; the
    /// first guard that fails aborts the whole batch with
    /// [`CatalogError::InsufficientStock`](crate::CatalogError::InsufficientStock).
    async fn batch_update_stock(&self, deltas: &[StockDelta]) -> Result<Vec<StockLevel>>;

    /// Applies one guarded delta.
    async fn update_stock(&self, delta: StockDelta) -> Result<StockLevel>;

    /// Current stock of the active products among `ids`. Unknown ids are absent.
    async fn stock_levels(&self, ids: &[ProductId]) -> Result<HashMap<ProductId, i64>>;

    /// Adds to the sales counter of an active product.
    ///
    /// Returns `None` when no active product has this id.
    async fn increment_sales(&self, id: ProductId, quantity: i64) -> Result<Option<SalesLevel>>;
}
