//! Inbound webhook endpoints.
//!
//! Each topic has its own path. Handlers take the raw body bytes so the
//! signature is computed over exactly what the platform sent; nothing is
//! parsed before authentication succeeds.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Router, response::IntoResponse};

use crate::state::AppState;
use crate::webhooks::{self, WebhookTopic};

/// Build the webhook router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/orders/create", post(orders_create))
        .route("/webhooks/orders/updated", post(orders_updated))
        .route("/webhooks/products/create", post(products_create))
        .route("/webhooks/products/update", post(products_update))
        .route("/webhooks/products/delete", post(products_delete))
        .route("/webhooks/app/uninstalled", post(app_uninstalled))
}

async fn orders_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    webhooks::process(&state, WebhookTopic::OrdersCreate, &headers, &body).await
}

async fn orders_updated(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    webhooks::process(&state, WebhookTopic::OrdersUpdated, &headers, &body).await
}

async fn products_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    webhooks::process(&state, WebhookTopic::ProductsCreate, &headers, &body).await
}

async fn products_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    webhooks::process(&state, WebhookTopic::ProductsUpdate, &headers, &body).await
}

async fn products_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    webhooks::process(&state, WebhookTopic::ProductsDelete, &headers, &body).await
}

async fn app_uninstalled(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    webhooks::process(&state, WebhookTopic::AppUninstalled, &headers, &body).await
}
