//! Mirrored order and order item records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use saltbox_core::{OrderId, OrderItemId, StoreId, VariantId};
use serde::Serialize;

/// Internal mirror of a platform-side order.
///
/// Uniquely identified by (store, external id). Monetary fields are
/// fixed-point decimals; the total identity
/// `total = subtotal - discount_total + tax_total + shipping_total`
/// is checked at sync time and recorded in `total_mismatch` when violated.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub store_id: StoreId,
    /// Platform-side order identifier.
    pub external_id: String,
    /// Human-facing order number, when the platform provides one.
    pub number: Option<String>,
    /// ISO 4217 currency code, carried verbatim from the platform.
    pub currency: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub shipping_total: Decimal,
    pub total: Decimal,
    /// Set when the platform-reported total does not add up from the parts.
    pub total_mismatch: bool,
    /// Internal fulfilment flag; never overwritten by platform snapshots.
    pub fulfillment_routed: bool,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line item on a mirrored order.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    /// Platform-side line item identifier.
    pub external_id: String,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    /// Platform-side variant identifier from the order payload, if any.
    pub external_variant_id: Option<String>,
    /// Mapped internal variant used for fulfilment routing. Preserved across
    /// re-syncs when the platform identifier no longer resolves.
    pub variant_id: Option<VariantId>,
    /// Set when no variant mapping could be computed; flagged for manual
    /// mapping rather than silently dropped.
    pub needs_mapping: bool,
}
