//! End-to-end webhook tests: raw HTTP requests through the router against
//! in-memory storage, with real platform adapters doing the signature
//! verification and payload parsing.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use saltbox_core::{OrganizationId, Platform};
use secrecy::SecretString;
use tower::ServiceExt;
use uuid::Uuid;

use saltbox_server::config::{AppConfig, PlatformAppConfig};
use saltbox_server::models::{CredentialWrite, NewStore, Store};
use saltbox_server::platform::PlatformAdapters;
use saltbox_server::routes;
use saltbox_server::state::AppState;
use saltbox_server::storage::{MemoryStorage, Storage};
use saltbox_server::webhooks::signature;

const SHOPIFY_SECRET: &str = "whsec_shopify_3f9a8b7c6d5e4f30";
const SHOP_DOMAIN: &str = "shop-a.example.com";

fn test_config() -> AppConfig {
    AppConfig {
        database_url: SecretString::from("postgres://localhost/saltbox_test"),
        host: "127.0.0.1".parse().expect("ip"),
        port: 0,
        base_url: "http://localhost:3002".to_string(),
        default_organization: OrganizationId::new(1),
        platform_timeout: Duration::from_secs(5),
        shopify: PlatformAppConfig {
            client_id: "shopify_client_id".to_string(),
            client_secret: SecretString::from(SHOPIFY_SECRET),
        },
        squarespace: PlatformAppConfig {
            client_id: "squarespace_client_id".to_string(),
            client_secret: SecretString::from("whsec_squarespace_19e2d3c4b5a69788"),
        },
        shopify_api_version: "2026-01".to_string(),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 1.0,
    }
}

async fn app_with_store() -> (Router, Arc<dyn Storage>, Store) {
    let config = test_config();
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let adapters = PlatformAdapters::from_config(&config).expect("http client");

    let store = storage
        .connect_store(
            NewStore {
                uid: Uuid::new_v4(),
                platform: Platform::Shopify,
                domain: SHOP_DOMAIN.to_string(),
                display_name: "Shop A".to_string(),
                organization_id: OrganizationId::new(1),
                created_by: None,
            },
            CredentialWrite {
                access_token: SecretString::from("shpat_test_token"),
                refresh_token: None,
                access_expires_at: None,
                refresh_expires_at: None,
            },
        )
        .await
        .expect("seed store");

    let state = AppState::new(config, storage.clone(), adapters);
    let app = routes::routes().with_state(state);
    (app, storage, store)
}

fn order_payload() -> Vec<u8> {
    br##"{
        "id": 1001,
        "name": "#1001",
        "currency": "USD",
        "subtotal_price": "20.00",
        "total_discounts": "0.00",
        "total_tax": "1.60",
        "total_shipping_price_set": {"shop_money": {"amount": "7.00", "currency_code": "USD"}},
        "total_price": "28.60",
        "line_items": [
            {"id": 11, "title": "8x10 Print", "quantity": 1, "price": "10.00", "variant_id": null},
            {"id": 12, "title": "5x7 Print", "quantity": 2, "price": "5.00", "variant_id": null}
        ]
    }"##
    .to_vec()
}

fn signed_request(path: &str, body: Vec<u8>) -> Request<Body> {
    let secret = SecretString::from(SHOPIFY_SECRET);
    let sig = signature::sign(&secret, &body);
    Request::builder()
        .method("POST")
        .uri(path)
        .header("x-shopify-hmac-sha256", sig)
        .header("x-shopify-shop-domain", SHOP_DOMAIN)
        .header("x-shopify-webhook-id", "delivery-1")
        .body(Body::from(body))
        .expect("request")
}

#[tokio::test]
async fn missing_signature_header_is_unauthorized() {
    let (app, _, _) = app_with_store().await;

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/orders/create")
        .header("x-shopify-shop-domain", SHOP_DOMAIN)
        .body(Body::from(order_payload()))
        .expect("request");

    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bad_signature_is_unauthorized() {
    let (app, storage, store) = app_with_store().await;

    let body = order_payload();
    let wrong = SecretString::from("not-the-signing-secret-0000000000");
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/orders/create")
        .header("x-shopify-hmac-sha256", signature::sign(&wrong, &body))
        .header("x-shopify-shop-domain", SHOP_DOMAIN)
        .body(Body::from(body))
        .expect("request");

    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // the handler never ran
    let order = storage
        .order_by_external_id(store.id, "1001")
        .await
        .expect("query");
    assert!(order.is_none());
}

#[tokio::test]
async fn missing_domain_header_is_bad_request() {
    let (app, _, _) = app_with_store().await;

    let body = order_payload();
    let secret = SecretString::from(SHOPIFY_SECRET);
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/orders/create")
        .header("x-shopify-hmac-sha256", signature::sign(&secret, &body))
        .body(Body::from(body))
        .expect("request");

    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_domain_is_not_found() {
    let (app, _, _) = app_with_store().await;

    let body = order_payload();
    let secret = SecretString::from(SHOPIFY_SECRET);
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/orders/create")
        .header("x-shopify-hmac-sha256", signature::sign(&secret, &body))
        .header("x-shopify-shop-domain", "nobody.example.com")
        .body(Body::from(body))
        .expect("request");

    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_delivered_twice_creates_one_order() {
    let (app, storage, store) = app_with_store().await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(signed_request("/webhooks/orders/create", order_payload()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let order = storage
        .order_by_external_id(store.id, "1001")
        .await
        .expect("query")
        .expect("order mirrored");
    assert_eq!(order.number.as_deref(), Some("#1001"));
    assert_eq!(order.items.len(), 2);
    assert!(!order.total_mismatch);
    // unmatched items are flagged, not dropped
    assert!(order.items.iter().all(|item| item.needs_mapping));
}

#[tokio::test]
async fn product_update_mirrors_product() {
    let (app, storage, store) = app_with_store().await;

    let body = br#"{
        "id": 77,
        "title": "Framed Print",
        "body_html": "<p>Giclee</p>",
        "options": [{"name": "Size", "values": ["8x10", "5x7"]}],
        "variants": [{"id": 771, "title": "8x10", "sku": "FP-8", "price": "45.00", "position": 1}]
    }"#
    .to_vec();

    let response = app
        .oneshot(signed_request("/webhooks/products/update", body))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let product = storage
        .product_by_external_id(store.id, "77")
        .await
        .expect("query")
        .expect("product mirrored");
    assert_eq!(product.title, "Framed Print");
    assert_eq!(product.options.len(), 1);
    assert_eq!(product.variants.len(), 1);
}

#[tokio::test]
async fn product_delete_removes_mirror() {
    let (app, storage, store) = app_with_store().await;

    let create = br#"{"id": 77, "title": "Framed Print"}"#.to_vec();
    let response = app
        .clone()
        .oneshot(signed_request("/webhooks/products/create", create))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let delete = br#"{"id": 77}"#.to_vec();
    let response = app
        .oneshot(signed_request("/webhooks/products/delete", delete))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    assert!(
        storage
            .product_by_external_id(store.id, "77")
            .await
            .expect("query")
            .is_none()
    );
}

#[tokio::test]
async fn malformed_payload_is_acknowledged_not_retried() {
    let (app, _, _) = app_with_store().await;

    let response = app
        .oneshot(signed_request(
            "/webhooks/orders/create",
            b"this is not json".to_vec(),
        ))
        .await
        .expect("response");

    // acknowledged to stop redelivery; the failure is recorded in the logs
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn deactivated_store_still_accepts_webhooks() {
    let (app, storage, store) = app_with_store().await;
    storage
        .set_store_active(store.id, false)
        .await
        .expect("deactivate");

    let response = app
        .oneshot(signed_request("/webhooks/orders/create", order_payload()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    assert!(
        storage
            .order_by_external_id(store.id, "1001")
            .await
            .expect("query")
            .is_some()
    );
}

#[tokio::test]
async fn uninstall_disconnects_the_store() {
    let (app, storage, store) = app_with_store().await;

    let response = app
        .clone()
        .oneshot(signed_request(
            "/webhooks/app/uninstalled",
            br#"{"id": 1}"#.to_vec(),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    // terminal: the tenant no longer resolves...
    assert!(storage.store_by_uid(store.uid).await.expect("query").is_none());

    // ...so further deliveries are refused, not queued
    let response = app
        .oneshot(signed_request("/webhooks/orders/create", order_payload()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
