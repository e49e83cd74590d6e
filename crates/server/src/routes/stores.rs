//! Store lifecycle and sync-trigger routes (admin JSON API).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use saltbox_core::{Money, Platform};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{OptionGroup, Order, Product, Store};
use crate::platform::ProductDraft;
use crate::state::AppState;
use crate::storage::Storage as _;
use crate::sync::{SyncReport, retry_transient};

/// Build the stores router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stores", get(list_stores))
        .route("/stores/{uid}", get(store_detail).delete(disconnect_store))
        .route("/stores/{uid}/activate", post(activate_store))
        .route("/stores/{uid}/deactivate", post(deactivate_store))
        .route("/stores/{uid}/products", post(create_product))
        .route(
            "/stores/{uid}/products/{external_id}/duplicate",
            post(duplicate_product),
        )
        .route("/stores/{uid}/orders/{external_id}", get(order_detail))
        .route("/stores/{uid}/sync/products", post(sync_products))
        .route("/stores/{uid}/sync/orders", post(sync_orders))
}

// =============================================================================
// Views & request bodies
// =============================================================================

/// Store as exposed to the admin API (no internal ids, no secrets).
#[derive(Debug, Serialize)]
pub struct StoreView {
    pub uid: Uuid,
    pub platform: Platform,
    pub domain: String,
    pub display_name: String,
    pub active: bool,
    pub connected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Store> for StoreView {
    fn from(store: Store) -> Self {
        Self {
            uid: store.uid,
            platform: store.platform,
            domain: store.domain,
            display_name: store.display_name,
            active: store.active,
            connected_at: store.created_at,
            updated_at: store.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub title: String,
    pub description_html: Option<String>,
    #[serde(default)]
    pub options: Vec<OptionGroup>,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateProductRequest {
    pub title: String,
    pub description_html: Option<String>,
}

/// Mirrored order as exposed to the admin API, used to review orders whose
/// items are flagged for manual variant mapping.
#[derive(Debug, Serialize)]
pub struct OrderView {
    pub external_id: String,
    pub number: Option<String>,
    pub total: Money,
    pub total_mismatch: bool,
    pub fulfillment_routed: bool,
    pub items: Vec<OrderItemView>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemView {
    pub external_id: String,
    pub title: String,
    pub quantity: i32,
    pub line_total: Money,
    pub mapped: bool,
    pub needs_mapping: bool,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        let currency = order.currency;
        Self {
            external_id: order.external_id,
            number: order.number,
            total: Money::new(order.total, currency.clone()),
            total_mismatch: order.total_mismatch,
            fulfillment_routed: order.fulfillment_routed,
            items: order
                .items
                .into_iter()
                .map(|item| OrderItemView {
                    external_id: item.external_id,
                    title: item.title,
                    quantity: item.quantity,
                    line_total: Money::new(item.line_total, currency.clone()),
                    mapped: item.variant_id.is_some(),
                    needs_mapping: item.needs_mapping,
                })
                .collect(),
        }
    }
}

async fn resolve_store(state: &AppState, uid: Uuid) -> Result<Store, AppError> {
    state
        .storage()
        .store_by_uid(uid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("store {uid}")))
}

// =============================================================================
// Route Handlers
// =============================================================================

/// GET /stores - List connected stores.
async fn list_stores(State(state): State<AppState>) -> Result<Json<Vec<StoreView>>, AppError> {
    let stores = state.storage().list_stores().await?;
    Ok(Json(stores.into_iter().map(StoreView::from).collect()))
}

/// GET /stores/{uid} - Store detail.
async fn store_detail(
    State(state): State<AppState>,
    Path(uid): Path<Uuid>,
) -> Result<Json<StoreView>, AppError> {
    let store = resolve_store(&state, uid).await?;
    Ok(Json(store.into()))
}

/// POST /stores/{uid}/activate - Re-enable a deactivated store.
#[instrument(skip(state))]
async fn activate_store(
    State(state): State<AppState>,
    Path(uid): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let store = resolve_store(&state, uid).await?;
    state.tenancy().activate(&store).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /stores/{uid}/deactivate - Soft-disable a store.
#[instrument(skip(state))]
async fn deactivate_store(
    State(state): State<AppState>,
    Path(uid): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let store = resolve_store(&state, uid).await?;
    state.tenancy().deactivate(&store).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /stores/{uid} - Terminal disconnect (alias of /disconnect/{uid}).
#[instrument(skip(state))]
async fn disconnect_store(
    State(state): State<AppState>,
    Path(uid): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let store = resolve_store(&state, uid).await?;
    state.tenancy().disconnect(&store).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /stores/{uid}/products - Create a product on the platform and mirror
/// it locally.
#[instrument(skip(state, request), fields(title = %request.title))]
async fn create_product(
    State(state): State<AppState>,
    Path(uid): Path<Uuid>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let store = resolve_store(&state, uid).await?;
    let draft = ProductDraft {
        title: request.title,
        description_html: request.description_html,
        options: request.options,
    };

    let product = retry_transient(state.retry_policy(), || {
        state.engine().create_product(&store, &draft)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// POST /stores/{uid}/products/{external_id}/duplicate - Duplicate a
/// product's option structure under a new title.
#[instrument(skip(state, request), fields(title = %request.title))]
async fn duplicate_product(
    State(state): State<AppState>,
    Path((uid, external_id)): Path<(Uuid, String)>,
    Json(request): Json<DuplicateProductRequest>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let store = resolve_store(&state, uid).await?;

    let product = retry_transient(state.retry_policy(), || {
        state.engine().duplicate_product(
            &store,
            &external_id,
            &request.title,
            request.description_html.as_deref(),
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /stores/{uid}/orders/{external_id} - Inspect a mirrored order.
async fn order_detail(
    State(state): State<AppState>,
    Path((uid, external_id)): Path<(Uuid, String)>,
) -> Result<Json<OrderView>, AppError> {
    let store = resolve_store(&state, uid).await?;
    let order = state
        .storage()
        .order_by_external_id(store.id, &external_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {external_id}")))?;
    Ok(Json(order.into()))
}

/// POST /stores/{uid}/sync/products - Full product resync.
#[instrument(skip(state))]
async fn sync_products(
    State(state): State<AppState>,
    Path(uid): Path<Uuid>,
) -> Result<Json<SyncReport>, AppError> {
    let store = resolve_store(&state, uid).await?;
    let report = retry_transient(state.retry_policy(), || {
        state.engine().sync_products(&store)
    })
    .await?;
    Ok(Json(report))
}

/// POST /stores/{uid}/sync/orders - Full order resync.
#[instrument(skip(state))]
async fn sync_orders(
    State(state): State<AppState>,
    Path(uid): Path<Uuid>,
) -> Result<Json<SyncReport>, AppError> {
    let store = resolve_store(&state, uid).await?;
    let report = retry_transient(state.retry_policy(), || {
        state.engine().sync_orders(&store)
    })
    .await?;
    Ok(Json(report))
}
