//! Synchronization engine: reconcile platform state into the internal
//! mirror, and push internal creations back to the platform.
//!
//! The platform is the source of truth for product/order content, so upserts
//! are a pure function of the latest snapshot: create-if-absent, otherwise
//! overwrite the mutable fields. Internal-only fields (variant mapping,
//! fulfilment flags) are preserved across re-syncs by the storage layer.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::models::{Order, Product, Store};
use crate::platform::{
    OrderSnapshot, PlatformAdapters, PlatformError, ProductDraft, ProductSnapshot,
};
use crate::storage::{OrderItemWrite, OrderWrite, Storage, StorageError};

pub mod refresh;
pub mod retry;

pub use refresh::TokenRefresher;
pub use retry::{RetryPolicy, Retryable, retry_transient};

/// Errors surfaced from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The platform rejected a create/update payload. Surfaced verbatim to
    /// the caller; never retried.
    #[error("validation rejected: {0}")]
    ValidationRejected(String),

    /// Transient network/5xx failure; the caller retries with backoff.
    #[error("platform unavailable: {0}")]
    PlatformUnavailable(String),

    /// Credential is dead; the tenant must reconnect the store.
    #[error("reauthorization required for this store")]
    ReauthorizationRequired,

    /// Deactivated stores refuse admin-triggered product creation.
    #[error("store is deactivated; product creation refused")]
    StoreDeactivated,

    /// The duplicate source does not exist on the platform.
    #[error("source product not found: {0}")]
    SourceNotFound(String),

    /// Any other platform-reported failure.
    #[error("platform error: {0}")]
    Platform(String),

    /// Storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<PlatformError> for SyncError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::ValidationRejected(message) => Self::ValidationRejected(message),
            PlatformError::Unavailable(message) => Self::PlatformUnavailable(message),
            PlatformError::ReauthorizationRequired(_) => Self::ReauthorizationRequired,
            PlatformError::NotFound(id) => Self::SourceNotFound(id),
            PlatformError::Rejected(message) | PlatformError::MalformedPayload(message) => {
                Self::Platform(message)
            }
        }
    }
}

impl Retryable for SyncError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::PlatformUnavailable(_))
    }
}

/// Outcome counts for a full resync.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
}

/// Orchestrates reconciliation between the platforms and the mirror.
pub struct SyncEngine {
    storage: Arc<dyn Storage>,
    adapters: PlatformAdapters,
    refresher: TokenRefresher,
}

impl SyncEngine {
    /// Create an engine over the given storage and adapters.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, adapters: PlatformAdapters) -> Self {
        let refresher = TokenRefresher::new(storage.clone(), adapters.clone());
        Self {
            storage,
            adapters,
            refresher,
        }
    }

    /// Mirror the latest platform snapshot of a product.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the upsert fails.
    #[instrument(skip(self, store, snapshot), fields(store_uid = %store.uid, external_id = %snapshot.external_id))]
    pub async fn upsert_product(
        &self,
        store: &Store,
        snapshot: &ProductSnapshot,
    ) -> Result<Product, SyncError> {
        Ok(self.storage.upsert_product(store.id, snapshot).await?)
    }

    /// Remove a mirrored product. Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if the delete fails.
    pub async fn delete_product(
        &self,
        store: &Store,
        external_id: &str,
    ) -> Result<bool, SyncError> {
        Ok(self.storage.delete_product(store.id, external_id).await?)
    }

    /// Mirror the latest platform snapshot of an order.
    ///
    /// Recomputes each item's variant mapping by matching platform variant
    /// identifiers against the mirrored variants. Items that no longer
    /// resolve keep their previous mapping; items that never resolved are
    /// flagged for manual mapping. The monetary identity
    /// `total = subtotal - discounts + tax + shipping` is checked and a
    /// mismatch is recorded on the order.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` if lookups or the upsert fail.
    #[instrument(skip(self, store, snapshot), fields(store_uid = %store.uid, external_id = %snapshot.external_id))]
    pub async fn upsert_order(
        &self,
        store: &Store,
        snapshot: &OrderSnapshot,
    ) -> Result<Order, SyncError> {
        let existing = self
            .storage
            .order_by_external_id(store.id, &snapshot.external_id)
            .await?;

        let mut items = Vec::with_capacity(snapshot.items.len());
        for item in &snapshot.items {
            let mapped = match item.external_variant_id.as_deref() {
                Some(external_variant_id) => self
                    .storage
                    .variant_by_external_id(store.id, external_variant_id)
                    .await?
                    .map(|variant| variant.id),
                None => None,
            };
            // A manual or previously-computed mapping survives snapshots that
            // no longer resolve.
            let preserved = existing
                .as_ref()
                .and_then(|order| {
                    order
                        .items
                        .iter()
                        .find(|existing_item| existing_item.external_id == item.external_id)
                })
                .and_then(|existing_item| existing_item.variant_id);
            let variant_id = mapped.or(preserved);
            let needs_mapping = variant_id.is_none();
            if needs_mapping {
                tracing::warn!(
                    store_uid = %store.uid,
                    order = %snapshot.external_id,
                    item = %item.external_id,
                    "order item has no variant mapping; flagged for manual mapping"
                );
            }

            items.push(OrderItemWrite {
                external_id: item.external_id.clone(),
                title: item.title.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                line_total: item.line_total,
                external_variant_id: item.external_variant_id.clone(),
                variant_id,
                needs_mapping,
            });
        }

        let computed = snapshot.subtotal - snapshot.discount_total
            + snapshot.tax_total
            + snapshot.shipping_total;
        let total_mismatch = computed != snapshot.total;
        if total_mismatch {
            tracing::warn!(
                store_uid = %store.uid,
                order = %snapshot.external_id,
                reported = %snapshot.total,
                computed = %computed,
                "order total does not add up; recorded as mismatch"
            );
        }

        let write = OrderWrite {
            external_id: snapshot.external_id.clone(),
            number: snapshot.number.clone(),
            currency: snapshot.currency.clone(),
            subtotal: snapshot.subtotal,
            discount_total: snapshot.discount_total,
            tax_total: snapshot.tax_total,
            shipping_total: snapshot.shipping_total,
            total: snapshot.total,
            total_mismatch,
            items,
        };
        Ok(self.storage.upsert_order(store.id, &write).await?)
    }

    /// Create a product on the platform, then mirror the platform's
    /// canonical response locally.
    ///
    /// # Errors
    ///
    /// - `SyncError::StoreDeactivated` if the store is deactivated.
    /// - `SyncError::ValidationRejected` on platform-side input errors.
    /// - `SyncError::PlatformUnavailable` on transient failures (the caller
    ///   retries with backoff).
    #[instrument(skip(self, store, draft), fields(store_uid = %store.uid, title = %draft.title))]
    pub async fn create_product(
        &self,
        store: &Store,
        draft: &ProductDraft,
    ) -> Result<Product, SyncError> {
        if !store.active {
            return Err(SyncError::StoreDeactivated);
        }

        let token = self.refresher.valid_token(store).await?;
        let snapshot = self
            .adapters
            .get(store.platform)
            .create_product(&token, &store.domain, draft)
            .await?;

        // Mirror immediately so the external id and any platform-normalized
        // fields are visible without waiting for a webhook.
        Ok(self.storage.upsert_product(store.id, &snapshot).await?)
    }

    /// Duplicate a product: copy the source's option-group structure onto a
    /// new product with the given title and description.
    ///
    /// Only the option structure is copied. Price, inventory, and images are
    /// deliberately not duplicated.
    ///
    /// # Errors
    ///
    /// - `SyncError::SourceNotFound` if the source does not exist.
    /// - Everything `create_product` can return.
    #[instrument(skip(self, store, new_description), fields(store_uid = %store.uid, source = %source_external_id))]
    pub async fn duplicate_product(
        &self,
        store: &Store,
        source_external_id: &str,
        new_title: &str,
        new_description: Option<&str>,
    ) -> Result<Product, SyncError> {
        if !store.active {
            return Err(SyncError::StoreDeactivated);
        }

        let token = self.refresher.valid_token(store).await?;
        let source = self
            .adapters
            .get(store.platform)
            .fetch_product(&token, &store.domain, source_external_id)
            .await?;

        let draft = ProductDraft {
            title: new_title.to_string(),
            description_html: new_description.map(String::from),
            options: source.options,
        };
        self.create_product(store, &draft).await
    }

    /// Pull-based full product resync.
    ///
    /// Each record commits individually, so an aborted sync leaves the mirror
    /// in its last-consistent upserted state and a resumed sync re-processes
    /// idempotently.
    ///
    /// # Errors
    ///
    /// Returns an error only when the listing itself fails; per-record
    /// failures are counted in the report.
    #[instrument(skip(self, store), fields(store_uid = %store.uid))]
    pub async fn sync_products(&self, store: &Store) -> Result<SyncReport, SyncError> {
        let token = self.refresher.valid_token(store).await?;
        let snapshots = self
            .adapters
            .get(store.platform)
            .list_products(&token, &store.domain)
            .await?;

        let mut report = SyncReport::default();
        for snapshot in &snapshots {
            match self.storage.upsert_product(store.id, snapshot).await {
                Ok(_) => report.synced += 1,
                Err(err) => {
                    tracing::error!(
                        store_uid = %store.uid,
                        external_id = %snapshot.external_id,
                        error = %err,
                        "product sync failed for record"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Pull-based full order resync. Same record-by-record discipline as
    /// [`Self::sync_products`].
    ///
    /// # Errors
    ///
    /// Returns an error only when the listing itself fails.
    #[instrument(skip(self, store), fields(store_uid = %store.uid))]
    pub async fn sync_orders(&self, store: &Store) -> Result<SyncReport, SyncError> {
        let token = self.refresher.valid_token(store).await?;
        let snapshots = self
            .adapters
            .get(store.platform)
            .list_orders(&token, &store.domain)
            .await?;

        let mut report = SyncReport::default();
        for snapshot in &snapshots {
            match self.upsert_order(store, snapshot).await {
                Ok(_) => report.synced += 1,
                Err(err) => {
                    tracing::error!(
                        store_uid = %store.uid,
                        external_id = %snapshot.external_id,
                        error = %err,
                        "order sync failed for record"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}
