//! Shopify platform adapter (REST Admin API + OAuth).

use async_trait::async_trait;
use rust_decimal::Decimal;
use saltbox_core::Platform;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::PlatformAppConfig;

use super::{
    OrderItemSnapshot, OrderSnapshot, PlatformAdapter, PlatformError, ProductDraft,
    ProductSnapshot, SiteInfo, TokenGrant, VariantSnapshot, WebhookScheme, check_status,
};

/// Scopes requested during the OAuth flow.
const SCOPES: &[&str] = &["read_products", "write_products", "read_orders"];

/// Shopify webhook header conventions.
const WEBHOOK_SCHEME: WebhookScheme = WebhookScheme {
    signature_header: "x-shopify-hmac-sha256",
    domain_header: "x-shopify-shop-domain",
    delivery_id_header: "x-shopify-webhook-id",
};

/// Adapter for Shopify stores.
///
/// Shopify's Admin API is per-shop: every URL embeds the shop's
/// `*.myshopify.com` domain, and offline access tokens never expire (so
/// `refresh_token` always reports that reconnection is required).
#[derive(Clone)]
pub struct ShopifyAdapter {
    client: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    api_version: String,
}

impl std::fmt::Debug for ShopifyAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyAdapter")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .finish_non_exhaustive()
    }
}

impl ShopifyAdapter {
    /// Create a new Shopify adapter.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &PlatformAppConfig, api_version: &str) -> Self {
        Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            api_version: api_version.to_string(),
        }
    }

    fn admin_url(&self, shop: &str, path: &str) -> String {
        format!("https://{shop}/admin/api/{}/{path}", self.api_version)
    }

    fn require_shop(shop_domain: Option<&str>) -> Result<&str, PlatformError> {
        shop_domain.ok_or_else(|| {
            PlatformError::Rejected("shopify operations require a shop domain".to_string())
        })
    }
}

#[async_trait]
impl PlatformAdapter for ShopifyAdapter {
    fn platform(&self) -> Platform {
        Platform::Shopify
    }

    fn webhook_scheme(&self) -> WebhookScheme {
        WEBHOOK_SCHEME
    }

    fn webhook_secret(&self) -> &SecretString {
        // Shopify signs webhook deliveries with the app's client secret.
        &self.client_secret
    }

    fn authorize_url(
        &self,
        shop_domain: Option<&str>,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, PlatformError> {
        let shop = Self::require_shop(shop_domain)?;
        let scope = SCOPES.join(",");
        Ok(format!(
            "https://{shop}/admin/oauth/authorize?client_id={}&scope={}&redirect_uri={}&state={}",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&scope),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        ))
    }

    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        code: &str,
        _redirect_uri: &str,
        shop_domain: Option<&str>,
    ) -> Result<TokenGrant, PlatformError> {
        let shop = Self::require_shop(shop_domain)?;
        let url = format!("https://{shop}/admin/oauth/access_token");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("code", code),
        ];

        let response = self.client.post(&url).form(&params).send().await?;
        let response = check_status(response).await?;
        let token: AccessTokenResponse = response.json().await?;

        Ok(TokenGrant {
            access_token: SecretString::from(token.access_token),
            // Offline tokens: no refresh token, no expiry.
            refresh_token: None,
            expires_in: None,
            refresh_expires_in: None,
        })
    }

    async fn refresh_token(
        &self,
        _refresh_token: &SecretString,
    ) -> Result<TokenGrant, PlatformError> {
        Err(PlatformError::ReauthorizationRequired(
            "shopify access tokens are not refreshable; reconnect the store".to_string(),
        ))
    }

    #[instrument(skip_all)]
    async fn fetch_site_info(
        &self,
        access_token: &SecretString,
        shop_domain: Option<&str>,
    ) -> Result<SiteInfo, PlatformError> {
        let shop = Self::require_shop(shop_domain)?;
        let response = self
            .client
            .get(self.admin_url(shop, "shop.json"))
            .header("X-Shopify-Access-Token", access_token.expose_secret())
            .send()
            .await?;
        let response = check_status(response).await?;
        let envelope: ShopEnvelope = response.json().await?;

        Ok(SiteInfo {
            domain: envelope.shop.myshopify_domain,
            display_name: envelope.shop.name,
        })
    }

    #[instrument(skip_all, fields(product_id = %external_id))]
    async fn fetch_product(
        &self,
        access_token: &SecretString,
        domain: &str,
        external_id: &str,
    ) -> Result<ProductSnapshot, PlatformError> {
        let response = self
            .client
            .get(self.admin_url(domain, &format!("products/{external_id}.json")))
            .header("X-Shopify-Access-Token", access_token.expose_secret())
            .send()
            .await?;
        let response = check_status(response).await?;
        let envelope: ProductEnvelope = response.json().await?;

        Ok(envelope.product.into())
    }

    #[instrument(skip_all, fields(title = %draft.title))]
    async fn create_product(
        &self,
        access_token: &SecretString,
        domain: &str,
        draft: &ProductDraft,
    ) -> Result<ProductSnapshot, PlatformError> {
        let request = ProductCreateRequest {
            product: ProductCreateBody {
                title: &draft.title,
                body_html: draft.description_html.as_deref(),
                options: draft
                    .options
                    .iter()
                    .map(|group| OptionPayload {
                        name: &group.name,
                        values: &group.values,
                    })
                    .collect(),
            },
        };

        let response = self
            .client
            .post(self.admin_url(domain, "products.json"))
            .header("X-Shopify-Access-Token", access_token.expose_secret())
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;
        let envelope: ProductEnvelope = response.json().await?;

        Ok(envelope.product.into())
    }

    #[instrument(skip_all)]
    async fn list_products(
        &self,
        access_token: &SecretString,
        domain: &str,
    ) -> Result<Vec<ProductSnapshot>, PlatformError> {
        let response = self
            .client
            .get(self.admin_url(domain, "products.json?limit=250"))
            .header("X-Shopify-Access-Token", access_token.expose_secret())
            .send()
            .await?;
        let response = check_status(response).await?;
        let envelope: ProductsEnvelope = response.json().await?;

        Ok(envelope.products.into_iter().map(Into::into).collect())
    }

    #[instrument(skip_all)]
    async fn list_orders(
        &self,
        access_token: &SecretString,
        domain: &str,
    ) -> Result<Vec<OrderSnapshot>, PlatformError> {
        let response = self
            .client
            .get(self.admin_url(domain, "orders.json?status=any&limit=250"))
            .header("X-Shopify-Access-Token", access_token.expose_secret())
            .send()
            .await?;
        let response = check_status(response).await?;
        let envelope: OrdersEnvelope = response.json().await?;

        Ok(envelope.orders.into_iter().map(Into::into).collect())
    }

    fn parse_product_webhook(&self, body: &[u8]) -> Result<ProductSnapshot, PlatformError> {
        let product: ShopifyProduct = serde_json::from_slice(body)
            .map_err(|e| PlatformError::MalformedPayload(e.to_string()))?;
        Ok(product.into())
    }

    fn parse_order_webhook(&self, body: &[u8]) -> Result<OrderSnapshot, PlatformError> {
        let order: ShopifyOrder = serde_json::from_slice(body)
            .map_err(|e| PlatformError::MalformedPayload(e.to_string()))?;
        Ok(order.into())
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ShopEnvelope {
    shop: ShopInfo,
}

#[derive(Debug, Deserialize)]
struct ShopInfo {
    myshopify_domain: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ProductEnvelope {
    product: ShopifyProduct,
}

#[derive(Debug, Deserialize)]
struct ProductsEnvelope {
    products: Vec<ShopifyProduct>,
}

#[derive(Debug, Deserialize)]
struct OrdersEnvelope {
    orders: Vec<ShopifyOrder>,
}

#[derive(Debug, Deserialize)]
struct ShopifyProduct {
    id: i64,
    title: String,
    #[serde(default)]
    body_html: Option<String>,
    #[serde(default)]
    options: Vec<ShopifyOption>,
    #[serde(default)]
    variants: Vec<ShopifyVariant>,
}

#[derive(Debug, Deserialize)]
struct ShopifyOption {
    name: String,
    #[serde(default)]
    values: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ShopifyVariant {
    id: i64,
    title: String,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    position: i32,
}

impl From<ShopifyProduct> for ProductSnapshot {
    fn from(product: ShopifyProduct) -> Self {
        Self {
            external_id: product.id.to_string(),
            title: product.title,
            description_html: product.body_html,
            options: product
                .options
                .into_iter()
                .map(|option| crate::models::OptionGroup {
                    name: option.name,
                    values: option.values,
                })
                .collect(),
            variants: product
                .variants
                .into_iter()
                .map(|variant| VariantSnapshot {
                    external_id: variant.id.to_string(),
                    title: variant.title,
                    sku: variant.sku,
                    price: variant.price,
                    position: variant.position,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ShopifyOrder {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    currency: String,
    #[serde(default)]
    subtotal_price: Decimal,
    #[serde(default)]
    total_discounts: Decimal,
    #[serde(default)]
    total_tax: Decimal,
    #[serde(default)]
    total_price: Decimal,
    #[serde(default)]
    total_shipping_price_set: Option<ShopifyPriceSet>,
    #[serde(default)]
    line_items: Vec<ShopifyLineItem>,
}

#[derive(Debug, Deserialize)]
struct ShopifyPriceSet {
    shop_money: ShopifyMoney,
}

#[derive(Debug, Deserialize)]
struct ShopifyMoney {
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct ShopifyLineItem {
    id: i64,
    title: String,
    quantity: i32,
    price: Decimal,
    #[serde(default)]
    variant_id: Option<i64>,
}

impl From<ShopifyOrder> for OrderSnapshot {
    fn from(order: ShopifyOrder) -> Self {
        Self {
            external_id: order.id.to_string(),
            number: order.name,
            currency: order.currency,
            subtotal: order.subtotal_price,
            discount_total: order.total_discounts,
            tax_total: order.total_tax,
            shipping_total: order
                .total_shipping_price_set
                .map_or(Decimal::ZERO, |set| set.shop_money.amount),
            total: order.total_price,
            items: order
                .line_items
                .into_iter()
                .map(|item| OrderItemSnapshot {
                    external_id: item.id.to_string(),
                    title: item.title,
                    quantity: item.quantity,
                    unit_price: item.price,
                    line_total: item.price * Decimal::from(item.quantity),
                    external_variant_id: item.variant_id.map(|id| id.to_string()),
                })
                .collect(),
        }
    }
}

// Used by `create_product`.
#[derive(Debug, Serialize)]
struct ProductCreateRequest<'a> {
    product: ProductCreateBody<'a>,
}

#[derive(Debug, Serialize)]
struct ProductCreateBody<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_html: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    options: Vec<OptionPayload<'a>>,
}

#[derive(Debug, Serialize)]
struct OptionPayload<'a> {
    name: &'a str,
    values: &'a [String],
}
