//! Mirrored product and variant records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use saltbox_core::{ProductId, StoreId, VariantId};
use serde::{Deserialize, Serialize};

/// A named option group on a product (e.g., "Size" with values "8x10", "5x7").
///
/// Groups and their values are ordered; the order is part of the platform's
/// representation and must survive a duplicate-creation round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionGroup {
    pub name: String,
    pub values: Vec<String>,
}

/// Internal mirror of a platform-side product.
///
/// Uniquely identified by (store, external id). Mutable fields are overwritten
/// wholesale from the latest platform snapshot on every sync.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub store_id: StoreId,
    /// Platform-side product identifier.
    pub external_id: String,
    pub title: String,
    pub description_html: Option<String>,
    /// Ordered option groups, mirrored losslessly from the platform.
    pub options: Vec<OptionGroup>,
    pub variants: Vec<ProductVariant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Internal mirror of a platform-side product variant.
#[derive(Debug, Clone, Serialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    /// Platform-side variant identifier, used for order item mapping.
    pub external_id: String,
    pub title: String,
    pub sku: Option<String>,
    pub price: Option<Decimal>,
    pub position: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_group_order_is_significant() {
        let a = OptionGroup {
            name: "Size".to_string(),
            values: vec!["8x10".to_string(), "5x7".to_string()],
        };
        let b = OptionGroup {
            name: "Size".to_string(),
            values: vec!["5x7".to_string(), "8x10".to_string()],
        };
        assert_ne!(a, b);
    }
}
