//! Persistence for stores, credentials, and the mirrored records.
//!
//! The [`Storage`] trait is the seam between the engine and the database:
//! [`PgStorage`] is the production `PostgreSQL` implementation, and
//! [`MemoryStorage`] backs the test-suite. Upserts are atomic at this layer,
//! keyed on (store, external id), so concurrent webhook re-deliveries and
//! admin syncs for the same resource serialize here rather than via
//! read-modify-write in the engine.

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use saltbox_core::{Platform, StoreId, VariantId};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Credential, CredentialWrite, NewStore, Order, Product, ProductVariant, Store};
use crate::platform::ProductSnapshot;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., duplicate (platform, domain)).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Order fields as computed by the sync engine for an atomic upsert.
///
/// `fulfillment_routed` is deliberately absent: internal-only fields are
/// preserved by the storage layer across re-syncs.
#[derive(Debug, Clone)]
pub struct OrderWrite {
    pub external_id: String,
    pub number: Option<String>,
    pub currency: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub shipping_total: Decimal,
    pub total: Decimal,
    pub total_mismatch: bool,
    pub items: Vec<OrderItemWrite>,
}

/// One line item in an [`OrderWrite`], with the variant mapping already
/// recomputed by the engine.
#[derive(Debug, Clone)]
pub struct OrderItemWrite {
    pub external_id: String,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub external_variant_id: Option<String>,
    pub variant_id: Option<VariantId>,
    pub needs_mapping: bool,
}

/// Persistence operations needed by the connector, router, and sync engine.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Whether the backing store is reachable (readiness probe).
    async fn healthy(&self) -> bool;

    // --- stores ---

    /// Upsert a store keyed by (platform, domain) and write its credential
    /// in the same transaction: either both commit or neither does.
    async fn connect_store(
        &self,
        new: NewStore,
        credential: CredentialWrite,
    ) -> Result<Store, StorageError>;

    async fn store_by_uid(&self, uid: Uuid) -> Result<Option<Store>, StorageError>;

    async fn store_by_domain(
        &self,
        platform: Platform,
        domain: &str,
    ) -> Result<Option<Store>, StorageError>;

    async fn list_stores(&self) -> Result<Vec<Store>, StorageError>;

    async fn set_store_active(&self, store_id: StoreId, active: bool)
    -> Result<(), StorageError>;

    /// Hard-delete a store together with its credential and mirrored records.
    async fn delete_store(&self, store_id: StoreId) -> Result<(), StorageError>;

    // --- credentials ---

    async fn credential_for_store(
        &self,
        store_id: StoreId,
    ) -> Result<Option<Credential>, StorageError>;

    async fn upsert_credential(
        &self,
        store_id: StoreId,
        write: CredentialWrite,
    ) -> Result<(), StorageError>;

    // --- products ---

    /// Create-or-overwrite a product from the latest platform snapshot.
    ///
    /// Variant identity is stable: a variant whose external id survives keeps
    /// its internal id, so order item mappings stay valid across re-syncs.
    async fn upsert_product(
        &self,
        store_id: StoreId,
        snapshot: &ProductSnapshot,
    ) -> Result<Product, StorageError>;

    async fn product_by_external_id(
        &self,
        store_id: StoreId,
        external_id: &str,
    ) -> Result<Option<Product>, StorageError>;

    /// Remove a mirrored product. Returns whether a record existed.
    async fn delete_product(
        &self,
        store_id: StoreId,
        external_id: &str,
    ) -> Result<bool, StorageError>;

    async fn variant_by_external_id(
        &self,
        store_id: StoreId,
        external_variant_id: &str,
    ) -> Result<Option<ProductVariant>, StorageError>;

    async fn list_products(&self, store_id: StoreId) -> Result<Vec<Product>, StorageError>;

    // --- orders ---

    /// Create-or-overwrite an order and its items in one transaction,
    /// preserving internal-only fields on conflict.
    async fn upsert_order(
        &self,
        store_id: StoreId,
        write: &OrderWrite,
    ) -> Result<Order, StorageError>;

    async fn order_by_external_id(
        &self,
        store_id: StoreId,
        external_id: &str,
    ) -> Result<Option<Order>, StorageError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(
    database_url: &secrecy::SecretString,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
