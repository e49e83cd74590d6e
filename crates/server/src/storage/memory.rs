//! In-memory [`Storage`] implementation.
//!
//! Backs the test-suite and local experiments. A single mutex makes every
//! operation atomic, mirroring the transactional guarantees of
//! [`super::PgStorage`].

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use saltbox_core::{
    CredentialId, OrderId, OrderItemId, Platform, ProductId, StoreId, VariantId,
};
use uuid::Uuid;

use crate::models::{
    Credential, CredentialWrite, NewStore, Order, OrderItem, Product, ProductVariant, Store,
};
use crate::platform::ProductSnapshot;

use super::{OrderWrite, Storage, StorageError};

/// In-memory storage; every operation holds the single lock for its duration.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    stores: HashMap<StoreId, Store>,
    credentials: HashMap<StoreId, Credential>,
    products: HashMap<(StoreId, String), Product>,
    orders: HashMap<(StoreId, String), Order>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStorage {
    /// Create an empty in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn healthy(&self) -> bool {
        true
    }

    async fn connect_store(
        &self,
        new: NewStore,
        credential: CredentialWrite,
    ) -> Result<Store, StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        let now = Utc::now();

        let existing = inner
            .stores
            .values()
            .find(|store| store.platform == new.platform && store.domain == new.domain)
            .map(|store| store.id);

        let store = if let Some(id) = existing {
            let store = inner
                .stores
                .get_mut(&id)
                .ok_or_else(|| StorageError::DataCorruption("store vanished".to_string()))?;
            store.display_name = new.display_name;
            store.updated_at = now;
            store.clone()
        } else {
            let id = StoreId::new(inner.next_id());
            let store = Store {
                id,
                uid: new.uid,
                platform: new.platform,
                domain: new.domain,
                display_name: new.display_name,
                active: true,
                organization_id: new.organization_id,
                created_by: new.created_by,
                created_at: now,
                updated_at: now,
            };
            inner.stores.insert(id, store.clone());
            store
        };

        let credential_id = CredentialId::new(inner.next_id());
        inner.credentials.insert(
            store.id,
            Credential {
                id: credential_id,
                store_id: store.id,
                access_token: credential.access_token,
                refresh_token: credential.refresh_token,
                access_expires_at: credential.access_expires_at,
                refresh_expires_at: credential.refresh_expires_at,
                updated_at: now,
            },
        );

        Ok(store)
    }

    async fn store_by_uid(&self, uid: Uuid) -> Result<Option<Store>, StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        Ok(inner.stores.values().find(|s| s.uid == uid).cloned())
    }

    async fn store_by_domain(
        &self,
        platform: Platform,
        domain: &str,
    ) -> Result<Option<Store>, StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        Ok(inner
            .stores
            .values()
            .find(|s| s.platform == platform && s.domain == domain)
            .cloned())
    }

    async fn list_stores(&self) -> Result<Vec<Store>, StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        let mut stores: Vec<Store> = inner.stores.values().cloned().collect();
        stores.sort_by_key(|s| s.id);
        Ok(stores)
    }

    async fn set_store_active(
        &self,
        store_id: StoreId,
        active: bool,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        let store = inner.stores.get_mut(&store_id).ok_or(StorageError::NotFound)?;
        store.active = active;
        store.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_store(&self, store_id: StoreId) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        if inner.stores.remove(&store_id).is_none() {
            return Err(StorageError::NotFound);
        }
        inner.credentials.remove(&store_id);
        inner.products.retain(|(owner, _), _| *owner != store_id);
        inner.orders.retain(|(owner, _), _| *owner != store_id);
        Ok(())
    }

    async fn credential_for_store(
        &self,
        store_id: StoreId,
    ) -> Result<Option<Credential>, StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        Ok(inner.credentials.get(&store_id).cloned())
    }

    async fn upsert_credential(
        &self,
        store_id: StoreId,
        write: CredentialWrite,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        if !inner.stores.contains_key(&store_id) {
            return Err(StorageError::NotFound);
        }
        let existing_id = inner.credentials.get(&store_id).map(|c| c.id);
        let id = match existing_id {
            Some(id) => id,
            None => CredentialId::new(inner.next_id()),
        };
        inner.credentials.insert(
            store_id,
            Credential {
                id,
                store_id,
                access_token: write.access_token,
                refresh_token: write.refresh_token,
                access_expires_at: write.access_expires_at,
                refresh_expires_at: write.refresh_expires_at,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn upsert_product(
        &self,
        store_id: StoreId,
        snapshot: &ProductSnapshot,
    ) -> Result<Product, StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        if !inner.stores.contains_key(&store_id) {
            return Err(StorageError::NotFound);
        }
        let now = Utc::now();
        let key = (store_id, snapshot.external_id.clone());

        let existing = inner
            .products
            .get(&key)
            .map(|p| (p.id, p.created_at, p.variants.clone()));
        let (product_id, created_at, previous_variants) = match existing {
            Some(parts) => parts,
            None => (ProductId::new(inner.next_id()), now, Vec::new()),
        };

        // Variants keep their internal id when the external id survives, so
        // order item mappings stay valid across re-syncs.
        let mut variants = Vec::with_capacity(snapshot.variants.len());
        for incoming in &snapshot.variants {
            let id = previous_variants
                .iter()
                .find(|v| v.external_id == incoming.external_id)
                .map_or_else(|| VariantId::new(inner.next_id()), |v| v.id);
            variants.push(ProductVariant {
                id,
                product_id,
                external_id: incoming.external_id.clone(),
                title: incoming.title.clone(),
                sku: incoming.sku.clone(),
                price: incoming.price,
                position: incoming.position,
            });
        }

        let product = Product {
            id: product_id,
            store_id,
            external_id: snapshot.external_id.clone(),
            title: snapshot.title.clone(),
            description_html: snapshot.description_html.clone(),
            options: snapshot.options.clone(),
            variants,
            created_at,
            updated_at: now,
        };
        inner.products.insert(key, product.clone());
        Ok(product)
    }

    async fn product_by_external_id(
        &self,
        store_id: StoreId,
        external_id: &str,
    ) -> Result<Option<Product>, StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        Ok(inner
            .products
            .get(&(store_id, external_id.to_string()))
            .cloned())
    }

    async fn delete_product(
        &self,
        store_id: StoreId,
        external_id: &str,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        Ok(inner
            .products
            .remove(&(store_id, external_id.to_string()))
            .is_some())
    }

    async fn variant_by_external_id(
        &self,
        store_id: StoreId,
        external_variant_id: &str,
    ) -> Result<Option<ProductVariant>, StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        Ok(inner
            .products
            .iter()
            .filter(|((owner, _), _)| *owner == store_id)
            .flat_map(|(_, product)| product.variants.iter())
            .find(|variant| variant.external_id == external_variant_id)
            .cloned())
    }

    async fn list_products(&self, store_id: StoreId) -> Result<Vec<Product>, StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        let mut products: Vec<Product> = inner
            .products
            .iter()
            .filter(|((owner, _), _)| *owner == store_id)
            .map(|(_, product)| product.clone())
            .collect();
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    async fn upsert_order(
        &self,
        store_id: StoreId,
        write: &OrderWrite,
    ) -> Result<Order, StorageError> {
        let mut inner = self.inner.lock().map_err(poisoned)?;
        if !inner.stores.contains_key(&store_id) {
            return Err(StorageError::NotFound);
        }
        let now = Utc::now();
        let key = (store_id, write.external_id.clone());

        let existing = inner.orders.get(&key).map(|o| {
            (o.id, o.created_at, o.fulfillment_routed, o.items.clone())
        });
        let (order_id, created_at, fulfillment_routed, previous_items) = match existing {
            Some(parts) => parts,
            None => (OrderId::new(inner.next_id()), now, false, Vec::new()),
        };

        let mut items = Vec::with_capacity(write.items.len());
        for incoming in &write.items {
            let id = previous_items
                .iter()
                .find(|item| item.external_id == incoming.external_id)
                .map_or_else(|| OrderItemId::new(inner.next_id()), |item| item.id);
            items.push(OrderItem {
                id,
                order_id,
                external_id: incoming.external_id.clone(),
                title: incoming.title.clone(),
                quantity: incoming.quantity,
                unit_price: incoming.unit_price,
                line_total: incoming.line_total,
                external_variant_id: incoming.external_variant_id.clone(),
                variant_id: incoming.variant_id,
                needs_mapping: incoming.needs_mapping,
            });
        }

        let order = Order {
            id: order_id,
            store_id,
            external_id: write.external_id.clone(),
            number: write.number.clone(),
            currency: write.currency.clone(),
            subtotal: write.subtotal,
            discount_total: write.discount_total,
            tax_total: write.tax_total,
            shipping_total: write.shipping_total,
            total: write.total,
            total_mismatch: write.total_mismatch,
            fulfillment_routed,
            items,
            created_at,
            updated_at: now,
        };
        inner.orders.insert(key, order.clone());
        Ok(order)
    }

    async fn order_by_external_id(
        &self,
        store_id: StoreId,
        external_id: &str,
    ) -> Result<Option<Order>, StorageError> {
        let inner = self.inner.lock().map_err(poisoned)?;
        Ok(inner
            .orders
            .get(&(store_id, external_id.to_string()))
            .cloned())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StorageError {
    StorageError::DataCorruption("storage mutex poisoned".to_string())
}
