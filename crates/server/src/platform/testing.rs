//! Configurable in-process adapter used by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use saltbox_core::Platform;
use secrecy::SecretString;

use super::{
    OrderSnapshot, PlatformAdapter, PlatformError, ProductDraft, ProductSnapshot, SiteInfo,
    TokenGrant, VariantSnapshot, WebhookScheme,
};

/// Scriptable [`PlatformAdapter`] that never touches the network.
pub(crate) struct MockAdapter {
    platform: Platform,
    secret: SecretString,
    exchange_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    create_calls: AtomicUsize,
    refresh_delay: Duration,
    fail_refresh: bool,
    /// This many `create_product` calls fail with `Unavailable` first.
    unavailable_creates: AtomicUsize,
    products: Mutex<HashMap<String, ProductSnapshot>>,
    orders: Mutex<Vec<OrderSnapshot>>,
    next_id: AtomicUsize,
}

impl MockAdapter {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            secret: SecretString::from("mock-webhook-signing-key"),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            refresh_delay: Duration::from_millis(0),
            fail_refresh: false,
            unavailable_creates: AtomicUsize::new(0),
            products: Mutex::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn failing_refresh(mut self) -> Self {
        self.fail_refresh = true;
        self
    }

    pub fn with_unavailable_creates(self, count: usize) -> Self {
        self.unavailable_creates.store(count, Ordering::SeqCst);
        self
    }

    pub fn insert_product(&self, snapshot: ProductSnapshot) {
        self.products
            .lock()
            .expect("mock products lock")
            .insert(snapshot.external_id.clone(), snapshot);
    }

    pub fn set_orders(&self, orders: Vec<OrderSnapshot>) {
        *self.orders.lock().expect("mock orders lock") = orders;
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn webhook_scheme(&self) -> WebhookScheme {
        match self.platform {
            Platform::Shopify => WebhookScheme {
                signature_header: "x-shopify-hmac-sha256",
                domain_header: "x-shopify-shop-domain",
                delivery_id_header: "x-shopify-webhook-id",
            },
            Platform::Squarespace => WebhookScheme {
                signature_header: "squarespace-signature",
                domain_header: "squarespace-site-domain",
                delivery_id_header: "squarespace-notification-id",
            },
        }
    }

    fn webhook_secret(&self) -> &SecretString {
        &self.secret
    }

    fn authorize_url(
        &self,
        _shop_domain: Option<&str>,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, PlatformError> {
        // state last so tests can peel it off the end
        Ok(format!(
            "https://auth.invalid/{}/authorize?redirect_uri={redirect_uri}&state={state}",
            self.platform
        ))
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
        _shop_domain: Option<&str>,
    ) -> Result<TokenGrant, PlatformError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TokenGrant {
            access_token: SecretString::from("mock-access-token"),
            refresh_token: Some(SecretString::from("mock-refresh-token")),
            expires_in: Some(1800),
            refresh_expires_in: None,
        })
    }

    async fn refresh_token(
        &self,
        _refresh_token: &SecretString,
    ) -> Result<TokenGrant, PlatformError> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        if self.fail_refresh {
            return Err(PlatformError::Rejected("refresh token revoked".into()));
        }
        Ok(TokenGrant {
            access_token: SecretString::from(format!("refreshed-access-{call}")),
            refresh_token: Some(SecretString::from(format!("refreshed-refresh-{call}"))),
            expires_in: Some(1800),
            refresh_expires_in: None,
        })
    }

    async fn fetch_site_info(
        &self,
        _access_token: &SecretString,
        shop_domain: Option<&str>,
    ) -> Result<SiteInfo, PlatformError> {
        Ok(SiteInfo {
            domain: shop_domain.unwrap_or("mock-site.example.com").to_string(),
            display_name: "Mock Store".to_string(),
        })
    }

    async fn fetch_product(
        &self,
        _access_token: &SecretString,
        _domain: &str,
        external_id: &str,
    ) -> Result<ProductSnapshot, PlatformError> {
        self.products
            .lock()
            .expect("mock products lock")
            .get(external_id)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(external_id.to_string()))
    }

    async fn create_product(
        &self,
        _access_token: &SecretString,
        _domain: &str,
        draft: &ProductDraft,
    ) -> Result<ProductSnapshot, PlatformError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable_creates.load(Ordering::SeqCst) > 0 {
            self.unavailable_creates.fetch_sub(1, Ordering::SeqCst);
            return Err(PlatformError::Unavailable("mock outage".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = ProductSnapshot {
            external_id: format!("mock-product-{id}"),
            title: draft.title.clone(),
            description_html: draft.description_html.clone(),
            options: draft.options.clone(),
            variants: Vec::<VariantSnapshot>::new(),
        };
        self.insert_product(snapshot.clone());
        Ok(snapshot)
    }

    async fn list_products(
        &self,
        _access_token: &SecretString,
        _domain: &str,
    ) -> Result<Vec<ProductSnapshot>, PlatformError> {
        let mut products: Vec<ProductSnapshot> = self
            .products
            .lock()
            .expect("mock products lock")
            .values()
            .cloned()
            .collect();
        products.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        Ok(products)
    }

    async fn list_orders(
        &self,
        _access_token: &SecretString,
        _domain: &str,
    ) -> Result<Vec<OrderSnapshot>, PlatformError> {
        Ok(self.orders.lock().expect("mock orders lock").clone())
    }

    fn parse_product_webhook(&self, _body: &[u8]) -> Result<ProductSnapshot, PlatformError> {
        Err(PlatformError::MalformedPayload(
            "mock adapter does not parse webhooks".into(),
        ))
    }

    fn parse_order_webhook(&self, _body: &[u8]) -> Result<OrderSnapshot, PlatformError> {
        Err(PlatformError::MalformedPayload(
            "mock adapter does not parse webhooks".into(),
        ))
    }
}
