//! Products and stock ledger value types.

use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Whether a product is on sale.
///
/// Inactive products are invisible to reads and refuse stock mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
}

impl ProductStatus {
    /// Returns the status as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Active => "active",
            ProductStatus::Inactive => "inactive",
        }
    }

    /// Returns true for sellable products.
    pub fn is_active(&self) -> bool {
        matches!(self, ProductStatus::Active)
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProductStatus::Active),
            "inactive" => Ok(ProductStatus::Inactive),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    /// Units on hand. Never negative.
    pub stock: i64,
    /// Units sold. Only ever grows.
    pub sales: i64,
    pub category: String,
    pub images: Vec<String>,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the image used for order and cart snapshots.
    pub fn first_image(&self) -> &str {
        self.images.first().map(String::as_str).unwrap_or_default()
    }
}

/// Fields for creating or editing a product.
///
/// Stock is set only at creation; edits never touch stock or sales.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    #[serde(default)]
    pub stock: i64,
    pub category: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub status: ProductStatus,
}

impl NewProduct {
    /// Checks the fields a product cannot exist without.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("product name is required"));
        }
        if !self.price.is_positive() {
            return Err(DomainError::validation("price must be greater than 0"));
        }
        if self.stock < 0 {
            return Err(DomainError::validation("stock cannot be negative"));
        }
        Ok(())
    }
}

/// A signed change to one product's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDelta {
    pub product_id: ProductId,
    pub delta: i64,
}

impl StockDelta {
    /// Creates a new stock delta.
    pub fn new(product_id: ProductId, delta: i64) -> Self {
        Self { product_id, delta }
    }

    /// The delta that undoes this one.
    pub fn inverse(&self) -> Self {
        Self {
            product_id: self.product_id,
            delta: -self.delta,
        }
    }
}

/// Stock of a product right after a ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub stock: i64,
    pub category: String,
}

/// How many units a caller wants to know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRequirement {
    pub product_id: ProductId,
    pub required: i64,
}

impl StockRequirement {
    /// Creates a new stock requirement.
    pub fn new(product_id: ProductId, required: i64) -> Self {
        Self {
            product_id,
            required,
        }
    }
}

/// Per-product answer of a stock check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAvailability {
    pub product_id: ProductId,
    pub required: i64,
    /// Zero for unknown or inactive products.
    pub available_stock: i64,
    pub available: bool,
}

/// Advisory snapshot of stock; the conditional update is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCheck {
    pub available: bool,
    pub items: Vec<StockAvailability>,
}

impl StockCheck {
    /// Builds the check from requirements and a stock lookup.
    pub fn evaluate(
        requirements: &[StockRequirement],
        stock_of: impl Fn(ProductId) -> Option<i64>,
    ) -> Self {
        let items: Vec<StockAvailability> = requirements
            .iter()
            .map(|req| {
                let available_stock = stock_of(req.product_id).unwrap_or(0);
                StockAvailability {
                    product_id: req.product_id,
                    required: req.required,
                    available_stock,
                    available: available_stock >= req.required,
                }
            })
            .collect();
        Self {
            available: items.iter().all(|i| i.available),
            items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_check_reports_each_item() {
        let reqs = [
            StockRequirement::new(ProductId::new(1), 2),
            StockRequirement::new(ProductId::new(2), 5),
            StockRequirement::new(ProductId::new(3), 1),
        ];
        let check = StockCheck::evaluate(&reqs, |id| match id.get() {
            1 => Some(10),
            2 => Some(4),
            _ => None,
        });

        assert!(!check.available);
        assert!(check.items[0].available);
        assert!(!check.items[1].available);
        assert_eq!(check.items[1].available_stock, 4);
        assert_eq!(check.items[2].available_stock, 0);
    }

    #[test]
    fn test_stock_check_all_available() {
        let reqs = [StockRequirement::new(ProductId::new(1), 3)];
        let check = StockCheck::evaluate(&reqs, |_| Some(3));
        assert!(check.available);
    }

    #[test]
    fn test_delta_inverse() {
        let delta = StockDelta::new(ProductId::new(4), -7);
        assert_eq!(delta.inverse(), StockDelta::new(ProductId::new(4), 7));
        assert_eq!(delta.inverse().inverse(), delta);
    }

    #[test]
    fn test_new_product_validation() {
        let mut product = NewProduct {
            name: "Lamp".to_string(),
            description: String::new(),
            price: Money::from_cents(1999),
            stock: 3,
            category: "home".to_string(),
            images: vec![],
            status: ProductStatus::Active,
        };
        assert!(product.validate().is_ok());

        product.price = Money::zero();
        assert!(product.validate().is_err());

        product.price = Money::from_cents(1);
        product.stock = -1;
        assert!(product.validate().is_err());
    }

    #[test]
    fn test_product_status_parse() {
        assert_eq!("active".parse::<ProductStatus>().unwrap(), ProductStatus::Active);
        assert!("gone".parse::<ProductStatus>().is_err());
    }
}
