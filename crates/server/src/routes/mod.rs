//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! # Inbound webhooks (one path per topic; raw-body signature verification)
//! POST /webhooks/orders/create
//! POST /webhooks/orders/updated
//! POST /webhooks/products/create
//! POST /webhooks/products/update
//! POST /webhooks/products/delete
//! POST /webhooks/app/uninstalled
//!
//! # OAuth
//! GET    /connect?platform=...&shop=...  - Redirect to the platform authorize URL
//! GET    /callback                       - Validate state, exchange code, upsert store
//! DELETE /disconnect/{uid}               - Terminal disconnect
//!
//! # Stores (admin JSON API)
//! GET    /stores                          - List connected stores
//! GET    /stores/{uid}                    - Store detail
//! POST   /stores/{uid}/activate           - Re-enable a deactivated store
//! POST   /stores/{uid}/deactivate         - Soft-disable a store
//! DELETE /stores/{uid}                    - Terminal disconnect (alias)
//! POST   /stores/{uid}/products           - Create a product on the platform
//! POST   /stores/{uid}/products/{id}/duplicate - Duplicate option structure
//! GET    /stores/{uid}/orders/{id}        - Inspect a mirrored order
//! POST   /stores/{uid}/sync/products      - Full product resync
//! POST   /stores/{uid}/sync/orders        - Full order resync
//! ```

pub mod oauth;
pub mod stores;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Compose all route groups.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(webhooks::router())
        .merge(oauth::router())
        .merge(stores::router())
}
