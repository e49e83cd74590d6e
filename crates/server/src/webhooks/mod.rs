//! Webhook authentication and dispatch.
//!
//! State machine per inbound delivery:
//! `Received → SignatureChecked → TenantResolved → Dispatched → {Acknowledged | Rejected}`.
//!
//! The signature is verified over the exact raw body bytes before anything is
//! parsed, the tenant is resolved before any handler runs, and handlers
//! receive the resolved store explicitly - there is no ambient tenant
//! context to leak between concurrent deliveries. Idempotency under
//! redelivery comes from the engine's upsert-by-external-id semantics, not
//! from the router.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::models::Store;
use crate::platform::PlatformAdapter;
use crate::state::AppState;
use crate::storage::Storage as _;
use crate::sync::{Retryable, SyncError, retry_transient};

pub mod signature;

/// Event topics routed to typed handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookTopic {
    OrdersCreate,
    OrdersUpdated,
    ProductsCreate,
    ProductsUpdate,
    ProductsDelete,
    AppUninstalled,
}

impl WebhookTopic {
    /// Canonical topic name as the platforms spell it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrdersCreate => "orders/create",
            Self::OrdersUpdated => "orders/updated",
            Self::ProductsCreate => "products/create",
            Self::ProductsUpdate => "products/update",
            Self::ProductsDelete => "products/delete",
            Self::AppUninstalled => "app/uninstalled",
        }
    }
}

impl std::fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Handler completed, or a non-retryable failure was recorded. The
    /// platform must not redeliver.
    Acknowledged,
    /// Missing or non-matching signature. The handler is never invoked.
    SignatureInvalid,
    /// The domain header is missing entirely (distinct from not-found).
    MissingDomainHeader,
    /// No store matches the claimed (platform, domain).
    TenantUnresolved,
    /// Retryable failure; the platform's delivery system should retry.
    RetryLater,
}

impl IntoResponse for WebhookOutcome {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Acknowledged => StatusCode::OK,
            Self::SignatureInvalid => StatusCode::UNAUTHORIZED,
            Self::MissingDomainHeader => StatusCode::BAD_REQUEST,
            Self::TenantUnresolved => StatusCode::NOT_FOUND,
            Self::RetryLater => StatusCode::INTERNAL_SERVER_ERROR,
        };
        status.into_response()
    }
}

/// Authenticate, resolve, and dispatch one webhook delivery.
pub async fn process(
    state: &AppState,
    topic: WebhookTopic,
    headers: &HeaderMap,
    body: &[u8],
) -> WebhookOutcome {
    // Received → SignatureChecked. The platform is identified by which
    // signature header is present; no header means nothing to verify.
    let Some((adapter, provided)) = identify(state, headers) else {
        tracing::warn!(%topic, "webhook rejected: no recognizable signature header");
        return WebhookOutcome::SignatureInvalid;
    };
    let platform = adapter.platform();
    if !signature::verify(adapter.webhook_secret(), body, &provided) {
        tracing::warn!(%platform, %topic, "webhook rejected: signature mismatch");
        return WebhookOutcome::SignatureInvalid;
    }

    let scheme = adapter.webhook_scheme();
    let delivery_id = header_str(headers, scheme.delivery_id_header);

    // SignatureChecked → TenantResolved
    let Some(domain) = header_str(headers, scheme.domain_header) else {
        tracing::warn!(
            %platform,
            %topic,
            delivery_id = delivery_id.as_deref(),
            "webhook rejected: missing domain header"
        );
        return WebhookOutcome::MissingDomainHeader;
    };
    let store = match state.storage().store_by_domain(platform, &domain).await {
        Ok(Some(store)) => store,
        Ok(None) => {
            tracing::warn!(
                %platform,
                %topic,
                %domain,
                delivery_id = delivery_id.as_deref(),
                "webhook rejected: unknown tenant"
            );
            return WebhookOutcome::TenantUnresolved;
        }
        Err(err) => {
            tracing::error!(
                %platform,
                %topic,
                %domain,
                delivery_id = delivery_id.as_deref(),
                error = %err,
                "tenant resolution failed"
            );
            return WebhookOutcome::RetryLater;
        }
    };

    // TenantResolved → Dispatched → {Acknowledged | Rejected}
    match dispatch(state, adapter.as_ref(), &store, topic, body).await {
        Ok(()) => WebhookOutcome::Acknowledged,
        Err(err) if err.is_retryable() || matches!(err, SyncError::Storage(_)) => {
            tracing::error!(
                %platform,
                %topic,
                domain = %store.domain,
                delivery_id = delivery_id.as_deref(),
                error = %err,
                "webhook handler failed; platform should retry"
            );
            WebhookOutcome::RetryLater
        }
        Err(err) => {
            // Malformed payloads and validation failures will not get better
            // on redelivery: acknowledge, record enough context to replay
            // the delivery manually.
            tracing::error!(
                %platform,
                %topic,
                domain = %store.domain,
                delivery_id = delivery_id.as_deref(),
                error = %err,
                "webhook handler failed; acknowledged to stop redelivery"
            );
            WebhookOutcome::Acknowledged
        }
    }
}

/// Pick the adapter whose signature header is present on the request.
fn identify<'a>(
    state: &'a AppState,
    headers: &HeaderMap,
) -> Option<(&'a Arc<dyn PlatformAdapter>, String)> {
    state.adapters().all().into_iter().find_map(|adapter| {
        headers
            .get(adapter.webhook_scheme().signature_header)
            .and_then(|value| value.to_str().ok())
            .map(|value| (adapter, value.to_string()))
    })
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn dispatch(
    state: &AppState,
    adapter: &dyn PlatformAdapter,
    store: &Store,
    topic: WebhookTopic,
    body: &[u8],
) -> Result<(), SyncError> {
    let policy = state.retry_policy();
    match topic {
        WebhookTopic::OrdersCreate | WebhookTopic::OrdersUpdated => {
            let snapshot = adapter.parse_order_webhook(body)?;
            retry_transient(policy, || state.engine().upsert_order(store, &snapshot))
                .await
                .map(|_| ())
        }
        WebhookTopic::ProductsCreate | WebhookTopic::ProductsUpdate => {
            let snapshot = adapter.parse_product_webhook(body)?;
            retry_transient(policy, || state.engine().upsert_product(store, &snapshot))
                .await
                .map(|_| ())
        }
        WebhookTopic::ProductsDelete => {
            let external_id = extract_external_id(body).ok_or_else(|| {
                SyncError::Platform("delete payload missing resource id".to_string())
            })?;
            let removed = state.engine().delete_product(store, &external_id).await?;
            if !removed {
                tracing::debug!(%external_id, "delete webhook for already-absent product");
            }
            Ok(())
        }
        WebhookTopic::AppUninstalled => {
            // terminal transition: uninstall == disconnect
            state
                .tenancy()
                .disconnect(store)
                .await
                .map_err(SyncError::from)
        }
    }
}

/// Resource id from a delete payload: `data.id` (Squarespace notification
/// envelope) or top-level `id` (Shopify).
fn extract_external_id(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let id = value
        .get("data")
        .and_then(|data| data.get("id"))
        .or_else(|| value.get("id"))?;
    match id {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
