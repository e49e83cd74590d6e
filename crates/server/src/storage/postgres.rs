//! `PostgreSQL` [`Storage`] implementation.
//!
//! All upserts are `ON CONFLICT` statements keyed on (store, external id), so
//! concurrent writers for the same resource serialize inside the database.
//! Internal-only columns (`fulfillment_routed`) are simply absent from the
//! conflict update lists, which is what preserves them across re-syncs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use saltbox_core::{
    CredentialId, OrderId, OrderItemId, Platform, ProductId, StoreId, UserId, VariantId,
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::models::{
    Credential, CredentialWrite, NewStore, OptionGroup, Order, OrderItem, Product, ProductVariant,
    Store,
};
use crate::platform::ProductSnapshot;

use super::{OrderWrite, Storage, StorageError};

/// Production storage backed by `PostgreSQL`.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run pending migrations from `crates/server/migrations`.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::migrate::MigrateError` if a migration fails.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// The underlying pool (readiness checks, ad-hoc queries).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn write_credential(
        tx: &mut Transaction<'_, Postgres>,
        store_id: StoreId,
        write: &CredentialWrite,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO credentials (store_id, access_token, refresh_token, access_expires_at, refresh_expires_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (store_id) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                access_expires_at = EXCLUDED.access_expires_at,
                refresh_expires_at = EXCLUDED.refresh_expires_at,
                updated_at = now()
            ",
        )
        .bind(store_id)
        .bind(write.access_token.expose_secret())
        .bind(write.refresh_token.as_ref().map(ExposeSecret::expose_secret))
        .bind(write.access_expires_at)
        .bind(write.refresh_expires_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn load_product(
        &self,
        store_id: StoreId,
        external_id: &str,
    ) -> Result<Product, StorageError> {
        self.product_by_external_id(store_id, external_id)
            .await?
            .ok_or_else(|| {
                StorageError::DataCorruption(format!(
                    "product {external_id} missing after upsert"
                ))
            })
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn healthy(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    async fn connect_store(
        &self,
        new: NewStore,
        credential: CredentialWrite,
    ) -> Result<Store, StorageError> {
        let mut tx = self.pool.begin().await?;

        let row: StoreRow = sqlx::query_as(
            r"
            INSERT INTO stores (uid, platform, domain, display_name, organization_id, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (platform, domain) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                updated_at = now()
            RETURNING id, uid, platform, domain, display_name, active,
                      organization_id, created_by, created_at, updated_at
            ",
        )
        .bind(new.uid)
        .bind(new.platform.as_str())
        .bind(&new.domain)
        .bind(&new.display_name)
        .bind(new.organization_id.as_i64())
        .bind(new.created_by.map(|id| id.as_i64()))
        .fetch_one(&mut *tx)
        .await?;

        let store: Store = row.try_into()?;
        Self::write_credential(&mut tx, store.id, &credential).await?;

        tx.commit().await?;
        Ok(store)
    }

    async fn store_by_uid(&self, uid: Uuid) -> Result<Option<Store>, StorageError> {
        let row: Option<StoreRow> = sqlx::query_as(
            r"
            SELECT id, uid, platform, domain, display_name, active,
                   organization_id, created_by, created_at, updated_at
            FROM stores
            WHERE uid = $1
            ",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn store_by_domain(
        &self,
        platform: Platform,
        domain: &str,
    ) -> Result<Option<Store>, StorageError> {
        let row: Option<StoreRow> = sqlx::query_as(
            r"
            SELECT id, uid, platform, domain, display_name, active,
                   organization_id, created_by, created_at, updated_at
            FROM stores
            WHERE platform = $1 AND domain = $2
            ",
        )
        .bind(platform.as_str())
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_stores(&self) -> Result<Vec<Store>, StorageError> {
        let rows: Vec<StoreRow> = sqlx::query_as(
            r"
            SELECT id, uid, platform, domain, display_name, active,
                   organization_id, created_by, created_at, updated_at
            FROM stores
            ORDER BY id
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_store_active(
        &self,
        store_id: StoreId,
        active: bool,
    ) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE stores SET active = $2, updated_at = now() WHERE id = $1")
            .bind(store_id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete_store(&self, store_id: StoreId) -> Result<(), StorageError> {
        // credentials, products, variants, orders, and items cascade
        let result = sqlx::query("DELETE FROM stores WHERE id = $1")
            .bind(store_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn credential_for_store(
        &self,
        store_id: StoreId,
    ) -> Result<Option<Credential>, StorageError> {
        let row: Option<CredentialRow> = sqlx::query_as(
            r"
            SELECT id, store_id, access_token, refresh_token,
                   access_expires_at, refresh_expires_at, updated_at
            FROM credentials
            WHERE store_id = $1
            ",
        )
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Credential::from))
    }

    async fn upsert_credential(
        &self,
        store_id: StoreId,
        write: CredentialWrite,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        Self::write_credential(&mut tx, store_id, &write).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_product(
        &self,
        store_id: StoreId,
        snapshot: &ProductSnapshot,
    ) -> Result<Product, StorageError> {
        let options = serde_json::to_value(&snapshot.options)
            .map_err(|e| StorageError::DataCorruption(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        let (product_id,): (ProductId,) = sqlx::query_as(
            r"
            INSERT INTO products (store_id, external_id, title, description_html, options)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (store_id, external_id) DO UPDATE SET
                title = EXCLUDED.title,
                description_html = EXCLUDED.description_html,
                options = EXCLUDED.options,
                updated_at = now()
            RETURNING id
            ",
        )
        .bind(store_id)
        .bind(&snapshot.external_id)
        .bind(&snapshot.title)
        .bind(snapshot.description_html.as_deref())
        .bind(&options)
        .fetch_one(&mut *tx)
        .await?;

        // Variants keep their internal id when the external id survives, so
        // order item mappings stay valid across re-syncs.
        let incoming_ids: Vec<String> = snapshot
            .variants
            .iter()
            .map(|v| v.external_id.clone())
            .collect();
        sqlx::query("DELETE FROM product_variants WHERE product_id = $1 AND external_id <> ALL($2)")
            .bind(product_id)
            .bind(&incoming_ids)
            .execute(&mut *tx)
            .await?;

        for variant in &snapshot.variants {
            sqlx::query(
                r"
                INSERT INTO product_variants (product_id, external_id, title, sku, price, position)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (product_id, external_id) DO UPDATE SET
                    title = EXCLUDED.title,
                    sku = EXCLUDED.sku,
                    price = EXCLUDED.price,
                    position = EXCLUDED.position
                ",
            )
            .bind(product_id)
            .bind(&variant.external_id)
            .bind(&variant.title)
            .bind(variant.sku.as_deref())
            .bind(variant.price)
            .bind(variant.position)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        self.load_product(store_id, &snapshot.external_id).await
    }

    async fn product_by_external_id(
        &self,
        store_id: StoreId,
        external_id: &str,
    ) -> Result<Option<Product>, StorageError> {
        let row: Option<ProductRow> = sqlx::query_as(
            r"
            SELECT id, store_id, external_id, title, description_html, options,
                   created_at, updated_at
            FROM products
            WHERE store_id = $1 AND external_id = $2
            ",
        )
        .bind(store_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let variants: Vec<VariantRow> = sqlx::query_as(
            r"
            SELECT id, product_id, external_id, title, sku, price, position
            FROM product_variants
            WHERE product_id = $1
            ORDER BY position, id
            ",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_product(variants)?))
    }

    async fn delete_product(
        &self,
        store_id: StoreId,
        external_id: &str,
    ) -> Result<bool, StorageError> {
        let result =
            sqlx::query("DELETE FROM products WHERE store_id = $1 AND external_id = $2")
                .bind(store_id)
                .bind(external_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn variant_by_external_id(
        &self,
        store_id: StoreId,
        external_variant_id: &str,
    ) -> Result<Option<ProductVariant>, StorageError> {
        let row: Option<VariantRow> = sqlx::query_as(
            r"
            SELECT v.id, v.product_id, v.external_id, v.title, v.sku, v.price, v.position
            FROM product_variants v
            JOIN products p ON p.id = v.product_id
            WHERE p.store_id = $1 AND v.external_id = $2
            ",
        )
        .bind(store_id)
        .bind(external_variant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ProductVariant::from))
    }

    async fn list_products(&self, store_id: StoreId) -> Result<Vec<Product>, StorageError> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            r"
            SELECT id, store_id, external_id, title, description_html, options,
                   created_at, updated_at
            FROM products
            WHERE store_id = $1
            ORDER BY id
            ",
        )
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            let variants: Vec<VariantRow> = sqlx::query_as(
                r"
                SELECT id, product_id, external_id, title, sku, price, position
                FROM product_variants
                WHERE product_id = $1
                ORDER BY position, id
                ",
            )
            .bind(row.id)
            .fetch_all(&self.pool)
            .await?;
            products.push(row.into_product(variants)?);
        }
        Ok(products)
    }

    async fn upsert_order(
        &self,
        store_id: StoreId,
        write: &OrderWrite,
    ) -> Result<Order, StorageError> {
        let mut tx = self.pool.begin().await?;

        // fulfillment_routed is not in the update list: internal-only fields
        // survive platform snapshots.
        let order_row: OrderRow = sqlx::query_as(
            r"
            INSERT INTO orders (store_id, external_id, number, currency, subtotal,
                                discount_total, tax_total, shipping_total, total, total_mismatch)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (store_id, external_id) DO UPDATE SET
                number = EXCLUDED.number,
                currency = EXCLUDED.currency,
                subtotal = EXCLUDED.subtotal,
                discount_total = EXCLUDED.discount_total,
                tax_total = EXCLUDED.tax_total,
                shipping_total = EXCLUDED.shipping_total,
                total = EXCLUDED.total,
                total_mismatch = EXCLUDED.total_mismatch,
                updated_at = now()
            RETURNING id, store_id, external_id, number, currency, subtotal,
                      discount_total, tax_total, shipping_total, total,
                      total_mismatch, fulfillment_routed, created_at, updated_at
            ",
        )
        .bind(store_id)
        .bind(&write.external_id)
        .bind(write.number.as_deref())
        .bind(&write.currency)
        .bind(write.subtotal)
        .bind(write.discount_total)
        .bind(write.tax_total)
        .bind(write.shipping_total)
        .bind(write.total)
        .bind(write.total_mismatch)
        .fetch_one(&mut *tx)
        .await?;

        let order_id = OrderId::new(order_row.id);

        let incoming_ids: Vec<String> = write
            .items
            .iter()
            .map(|item| item.external_id.clone())
            .collect();
        sqlx::query("DELETE FROM order_items WHERE order_id = $1 AND external_id <> ALL($2)")
            .bind(order_id)
            .bind(&incoming_ids)
            .execute(&mut *tx)
            .await?;

        for item in &write.items {
            sqlx::query(
                r"
                INSERT INTO order_items (order_id, external_id, title, quantity, unit_price,
                                         line_total, external_variant_id, variant_id, needs_mapping)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (order_id, external_id) DO UPDATE SET
                    title = EXCLUDED.title,
                    quantity = EXCLUDED.quantity,
                    unit_price = EXCLUDED.unit_price,
                    line_total = EXCLUDED.line_total,
                    external_variant_id = EXCLUDED.external_variant_id,
                    variant_id = EXCLUDED.variant_id,
                    needs_mapping = EXCLUDED.needs_mapping
                ",
            )
            .bind(order_id)
            .bind(&item.external_id)
            .bind(&item.title)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.line_total)
            .bind(item.external_variant_id.as_deref())
            .bind(item.variant_id)
            .bind(item.needs_mapping)
            .execute(&mut *tx)
            .await?;
        }

        let item_rows: Vec<OrderItemRow> = sqlx::query_as(
            r"
            SELECT id, order_id, external_id, title, quantity, unit_price,
                   line_total, external_variant_id, variant_id, needs_mapping
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order_row.into_order(item_rows))
    }

    async fn order_by_external_id(
        &self,
        store_id: StoreId,
        external_id: &str,
    ) -> Result<Option<Order>, StorageError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r"
            SELECT id, store_id, external_id, number, currency, subtotal,
                   discount_total, tax_total, shipping_total, total,
                   total_mismatch, fulfillment_routed, created_at, updated_at
            FROM orders
            WHERE store_id = $1 AND external_id = $2
            ",
        )
        .bind(store_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items: Vec<OrderItemRow> = sqlx::query_as(
            r"
            SELECT id, order_id, external_id, title, quantity, unit_price,
                   line_total, external_variant_id, variant_id, needs_mapping
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(row.into_order(items)))
    }
}

// =============================================================================
// Row types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    id: i64,
    uid: Uuid,
    platform: String,
    domain: String,
    display_name: String,
    active: bool,
    organization_id: i64,
    created_by: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StoreRow> for Store {
    type Error = StorageError;

    fn try_from(row: StoreRow) -> Result<Self, StorageError> {
        let platform: Platform = row.platform.parse().map_err(|_| {
            StorageError::DataCorruption(format!("unknown platform '{}'", row.platform))
        })?;

        Ok(Self {
            id: StoreId::new(row.id),
            uid: row.uid,
            platform,
            domain: row.domain,
            display_name: row.display_name,
            active: row.active,
            organization_id: row.organization_id.into(),
            created_by: row.created_by.map(UserId::new),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
    id: i64,
    store_id: i64,
    access_token: String,
    refresh_token: Option<String>,
    access_expires_at: Option<DateTime<Utc>>,
    refresh_expires_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl From<CredentialRow> for Credential {
    fn from(row: CredentialRow) -> Self {
        Self {
            id: CredentialId::new(row.id),
            store_id: StoreId::new(row.store_id),
            access_token: SecretString::from(row.access_token),
            refresh_token: row.refresh_token.map(SecretString::from),
            access_expires_at: row.access_expires_at,
            refresh_expires_at: row.refresh_expires_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    store_id: i64,
    external_id: String,
    title: String,
    description_html: Option<String>,
    options: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self, variants: Vec<VariantRow>) -> Result<Product, StorageError> {
        let options: Vec<OptionGroup> = serde_json::from_value(self.options)
            .map_err(|e| StorageError::DataCorruption(format!("bad options json: {e}")))?;

        Ok(Product {
            id: ProductId::new(self.id),
            store_id: StoreId::new(self.store_id),
            external_id: self.external_id,
            title: self.title,
            description_html: self.description_html,
            options,
            variants: variants.into_iter().map(ProductVariant::from).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: i64,
    product_id: i64,
    external_id: String,
    title: String,
    sku: Option<String>,
    price: Option<Decimal>,
    position: i32,
}

impl From<VariantRow> for ProductVariant {
    fn from(row: VariantRow) -> Self {
        Self {
            id: VariantId::new(row.id),
            product_id: ProductId::new(row.product_id),
            external_id: row.external_id,
            title: row.title,
            sku: row.sku,
            price: row.price,
            position: row.position,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    store_id: i64,
    external_id: String,
    number: Option<String>,
    currency: String,
    subtotal: Decimal,
    discount_total: Decimal,
    tax_total: Decimal,
    shipping_total: Decimal,
    total: Decimal,
    total_mismatch: bool,
    fulfillment_routed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItemRow>) -> Order {
        Order {
            id: OrderId::new(self.id),
            store_id: StoreId::new(self.store_id),
            external_id: self.external_id,
            number: self.number,
            currency: self.currency,
            subtotal: self.subtotal,
            discount_total: self.discount_total,
            tax_total: self.tax_total,
            shipping_total: self.shipping_total,
            total: self.total,
            total_mismatch: self.total_mismatch,
            fulfillment_routed: self.fulfillment_routed,
            items: items.into_iter().map(OrderItem::from).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: i64,
    order_id: i64,
    external_id: String,
    title: String,
    quantity: i32,
    unit_price: Decimal,
    line_total: Decimal,
    external_variant_id: Option<String>,
    variant_id: Option<i64>,
    needs_mapping: bool,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: OrderItemId::new(row.id),
            order_id: OrderId::new(row.order_id),
            external_id: row.external_id,
            title: row.title,
            quantity: row.quantity,
            unit_price: row.unit_price,
            line_total: row.line_total,
            external_variant_id: row.external_variant_id,
            variant_id: row.variant_id.map(VariantId::new),
            needs_mapping: row.needs_mapping,
        }
    }
}
