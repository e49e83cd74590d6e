//! Platform adapters for the supported commerce platforms.
//!
//! Each adapter translates the generic operations the rest of the system
//! needs (token exchange, site info, product fetch/create, token refresh,
//! webhook payload parsing) into platform-specific HTTP calls and response
//! shapes. The adapter owns its base URL, auth header scheme, and parsing;
//! callers only see the [`PlatformAdapter`] contract and pick the concrete
//! implementation by the store's platform field.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use saltbox_core::Platform;
use secrecy::SecretString;
use thiserror::Error;

use crate::config::AppConfig;
use crate::models::OptionGroup;

pub mod shopify;
pub mod squarespace;

#[cfg(test)]
pub(crate) mod testing;

pub use shopify::ShopifyAdapter;
pub use squarespace::SquarespaceAdapter;

/// Errors that can occur when talking to a platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The platform reported an OAuth or API error. Message is verbatim.
    #[error("platform rejected the request: {0}")]
    Rejected(String),

    /// The platform rejected a create/update payload. Not retryable.
    #[error("validation rejected: {0}")]
    ValidationRejected(String),

    /// The stored credential is dead; the tenant must reconnect.
    #[error("reauthorization required: {0}")]
    ReauthorizationRequired(String),

    /// Transient network/5xx failure. Eligible for retry with backoff.
    #[error("platform unavailable: {0}")]
    Unavailable(String),

    /// The requested resource does not exist on the platform.
    #[error("not found: {0}")]
    NotFound(String),

    /// A response or webhook payload did not have the documented shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedPayload(err.to_string())
        } else {
            // Timeouts, connect failures, and other transport errors are
            // transient from the caller's point of view.
            Self::Unavailable(err.to_string())
        }
    }
}

/// Map a non-success platform response to the error taxonomy.
///
/// Returns the response untouched when the status is a success.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        401 | 403 => PlatformError::ReauthorizationRequired(body),
        404 => PlatformError::NotFound(body),
        422 => PlatformError::ValidationRejected(body),
        429 => PlatformError::Unavailable(format!("rate limited: {body}")),
        code if status.is_server_error() => {
            PlatformError::Unavailable(format!("status {code}: {body}"))
        }
        _ => PlatformError::Rejected(body),
    })
}

/// Token material returned by a token exchange or refresh call.
///
/// Implements `Debug` manually to redact both tokens.
#[derive(Clone)]
pub struct TokenGrant {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Access token lifetime in seconds; `None` means it does not expire.
    pub expires_in: Option<i64>,
    /// Refresh token lifetime in seconds, if the platform reports one.
    pub refresh_expires_in: Option<i64>,
}

impl TokenGrant {
    /// Convert into credential fields, resolving relative expiries against
    /// the current clock.
    #[must_use]
    pub fn into_credential_write(self) -> crate::models::CredentialWrite {
        let now = chrono::Utc::now();
        crate::models::CredentialWrite {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            access_expires_at: self
                .expires_in
                .map(|seconds| now + chrono::Duration::seconds(seconds)),
            refresh_expires_at: self
                .refresh_expires_in
                .map(|seconds| now + chrono::Duration::seconds(seconds)),
        }
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .finish()
    }
}

/// Minimal site identity fetched right after the OAuth exchange.
#[derive(Debug, Clone)]
pub struct SiteInfo {
    pub domain: String,
    pub display_name: String,
}

/// Input for creating a product on the platform.
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub title: String,
    pub description_html: Option<String>,
    /// Ordered option groups copied verbatim onto the new product.
    pub options: Vec<OptionGroup>,
}

/// The platform's latest view of a product.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSnapshot {
    pub external_id: String,
    pub title: String,
    pub description_html: Option<String>,
    pub options: Vec<OptionGroup>,
    pub variants: Vec<VariantSnapshot>,
}

/// The platform's latest view of a product variant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSnapshot {
    pub external_id: String,
    pub title: String,
    pub sku: Option<String>,
    pub price: Option<Decimal>,
    pub position: i32,
}

/// The platform's latest view of an order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub external_id: String,
    pub number: Option<String>,
    pub currency: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub shipping_total: Decimal,
    pub total: Decimal,
    pub items: Vec<OrderItemSnapshot>,
}

/// One line item in an order snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItemSnapshot {
    pub external_id: String,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub external_variant_id: Option<String>,
}

/// Header names and conventions for one platform's webhook deliveries.
#[derive(Debug, Clone, Copy)]
pub struct WebhookScheme {
    /// Header carrying the base64 HMAC-SHA256 of the raw request body.
    pub signature_header: &'static str,
    /// Header carrying the shop/site domain that identifies the tenant.
    pub domain_header: &'static str,
    /// Header carrying the platform-assigned delivery identifier.
    pub delivery_id_header: &'static str,
}

/// Capability interface implemented once per platform.
///
/// Selected by the store's platform field; no inheritance, no duck typing.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// The platform this adapter talks to.
    fn platform(&self) -> Platform;

    /// Webhook header names and signature convention.
    fn webhook_scheme(&self) -> WebhookScheme;

    /// Secret used to verify inbound webhook signatures.
    fn webhook_secret(&self) -> &SecretString;

    /// Build the authorize URL the merchant's browser is redirected to.
    ///
    /// Shopify requires the shop domain up front; Squarespace does not.
    ///
    /// # Errors
    ///
    /// Returns `PlatformError::Rejected` if a required shop domain is missing.
    fn authorize_url(
        &self,
        shop_domain: Option<&str>,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, PlatformError>;

    /// Exchange an authorization code for token material.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        shop_domain: Option<&str>,
    ) -> Result<TokenGrant, PlatformError>;

    /// Exchange a refresh token for fresh token material.
    async fn refresh_token(&self, refresh_token: &SecretString)
    -> Result<TokenGrant, PlatformError>;

    /// Fetch the minimal site identity (domain, display name).
    async fn fetch_site_info(
        &self,
        access_token: &SecretString,
        shop_domain: Option<&str>,
    ) -> Result<SiteInfo, PlatformError>;

    /// Fetch one product by its platform-side id.
    async fn fetch_product(
        &self,
        access_token: &SecretString,
        domain: &str,
        external_id: &str,
    ) -> Result<ProductSnapshot, PlatformError>;

    /// Create a product remotely and return the platform's canonical view.
    async fn create_product(
        &self,
        access_token: &SecretString,
        domain: &str,
        draft: &ProductDraft,
    ) -> Result<ProductSnapshot, PlatformError>;

    /// List products for a full resync.
    async fn list_products(
        &self,
        access_token: &SecretString,
        domain: &str,
    ) -> Result<Vec<ProductSnapshot>, PlatformError>;

    /// List orders for a full resync.
    async fn list_orders(
        &self,
        access_token: &SecretString,
        domain: &str,
    ) -> Result<Vec<OrderSnapshot>, PlatformError>;

    /// Parse a product webhook payload into a snapshot.
    fn parse_product_webhook(&self, body: &[u8]) -> Result<ProductSnapshot, PlatformError>;

    /// Parse an order webhook payload into a snapshot.
    fn parse_order_webhook(&self, body: &[u8]) -> Result<OrderSnapshot, PlatformError>;
}

/// Registry of the configured platform adapters, selected by platform field.
#[derive(Clone)]
pub struct PlatformAdapters {
    shopify: Arc<dyn PlatformAdapter>,
    squarespace: Arc<dyn PlatformAdapter>,
}

impl PlatformAdapters {
    /// Build the registry from explicit adapters (tests inject mocks here).
    #[must_use]
    pub fn new(shopify: Arc<dyn PlatformAdapter>, squarespace: Arc<dyn PlatformAdapter>) -> Self {
        Self {
            shopify,
            squarespace,
        }
    }

    /// Build the production adapters from configuration.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the shared HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        // One shared client; the bounded timeout keeps a hung platform call
        // from blocking unrelated stores' processing.
        let client = reqwest::Client::builder()
            .timeout(config.platform_timeout)
            .build()?;

        Ok(Self::new(
            Arc::new(ShopifyAdapter::new(
                client.clone(),
                &config.shopify,
                &config.shopify_api_version,
            )),
            Arc::new(SquarespaceAdapter::new(client, &config.squarespace)),
        ))
    }

    /// The adapter for the given platform.
    #[must_use]
    pub fn get(&self, platform: Platform) -> &Arc<dyn PlatformAdapter> {
        match platform {
            Platform::Shopify => &self.shopify,
            Platform::Squarespace => &self.squarespace,
        }
    }

    /// All configured adapters, in `Platform::ALL` order.
    #[must_use]
    pub fn all(&self) -> [&Arc<dyn PlatformAdapter>; 2] {
        [&self.shopify, &self.squarespace]
    }
}
