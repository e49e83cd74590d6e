//! Squarespace platform adapter (Commerce API + OAuth).

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use saltbox_core::Platform;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::PlatformAppConfig;
use crate::models::OptionGroup;

use super::{
    OrderItemSnapshot, OrderSnapshot, PlatformAdapter, PlatformError, ProductDraft,
    ProductSnapshot, SiteInfo, TokenGrant, VariantSnapshot, WebhookScheme, check_status,
};

/// OAuth endpoints live on the login host, API calls on the api host.
const LOGIN_BASE: &str = "https://login.squarespace.com/api/1/login/oauth/provider";
const API_BASE: &str = "https://api.squarespace.com/1.0";

/// Scopes requested during the OAuth flow.
const SCOPE: &str = "website.products,website.orders";

/// Squarespace webhook header conventions.
const WEBHOOK_SCHEME: WebhookScheme = WebhookScheme {
    signature_header: "squarespace-signature",
    domain_header: "squarespace-site-domain",
    delivery_id_header: "squarespace-notification-id",
};

/// Adapter for Squarespace sites.
///
/// Squarespace access tokens are short-lived and come with a refresh token,
/// so this adapter implements the full refresh flow. API calls are not
/// per-site: the access token itself selects the site.
#[derive(Clone)]
pub struct SquarespaceAdapter {
    client: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
}

impl std::fmt::Debug for SquarespaceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquarespaceAdapter")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SquarespaceAdapter {
    /// Create a new Squarespace adapter.
    #[must_use]
    pub fn new(client: reqwest::Client, config: &PlatformAppConfig) -> Self {
        Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    async fn request_tokens(&self, body: &TokenRequest<'_>) -> Result<TokenGrant, PlatformError> {
        let response = self
            .client
            .post(format!("{LOGIN_BASE}/tokens"))
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .json(body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let token: TokenResponse = response.json().await?;

        Ok(TokenGrant {
            access_token: SecretString::from(token.access_token),
            refresh_token: token.refresh_token.map(SecretString::from),
            expires_in: token.expires_in,
            refresh_expires_in: token.refresh_token_expires_in,
        })
    }
}

#[async_trait]
impl PlatformAdapter for SquarespaceAdapter {
    fn platform(&self) -> Platform {
        Platform::Squarespace
    }

    fn webhook_scheme(&self) -> WebhookScheme {
        WEBHOOK_SCHEME
    }

    fn webhook_secret(&self) -> &SecretString {
        // Squarespace signs webhook notifications with the app's client secret.
        &self.client_secret
    }

    fn authorize_url(
        &self,
        _shop_domain: Option<&str>,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String, PlatformError> {
        Ok(format!(
            "{LOGIN_BASE}/authorize?client_id={}&scope={}&redirect_uri={}&state={}&access_type=offline",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(SCOPE),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        ))
    }

    #[instrument(skip_all)]
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        _shop_domain: Option<&str>,
    ) -> Result<TokenGrant, PlatformError> {
        self.request_tokens(&TokenRequest {
            grant_type: "authorization_code",
            code: Some(code),
            redirect_uri: Some(redirect_uri),
            refresh_token: None,
        })
        .await
    }

    #[instrument(skip_all)]
    async fn refresh_token(
        &self,
        refresh_token: &SecretString,
    ) -> Result<TokenGrant, PlatformError> {
        self.request_tokens(&TokenRequest {
            grant_type: "refresh_token",
            code: None,
            redirect_uri: None,
            refresh_token: Some(refresh_token.expose_secret()),
        })
        .await
    }

    #[instrument(skip_all)]
    async fn fetch_site_info(
        &self,
        access_token: &SecretString,
        _shop_domain: Option<&str>,
    ) -> Result<SiteInfo, PlatformError> {
        let response = self
            .client
            .get(format!("{API_BASE}/authorization/website"))
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;
        let response = check_status(response).await?;
        let website: Website = response.json().await?;

        Ok(SiteInfo {
            domain: website.primary_domain,
            display_name: website.title,
        })
    }

    #[instrument(skip_all, fields(product_id = %external_id))]
    async fn fetch_product(
        &self,
        access_token: &SecretString,
        _domain: &str,
        external_id: &str,
    ) -> Result<ProductSnapshot, PlatformError> {
        let response = self
            .client
            .get(format!("{API_BASE}/commerce/products/{external_id}"))
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;
        let response = check_status(response).await?;
        let product: SquarespaceProduct = response.json().await?;

        Ok(product.into())
    }

    #[instrument(skip_all, fields(title = %draft.title))]
    async fn create_product(
        &self,
        access_token: &SecretString,
        _domain: &str,
        draft: &ProductDraft,
    ) -> Result<ProductSnapshot, PlatformError> {
        let request = ProductCreateRequest {
            kind: "PHYSICAL",
            name: &draft.title,
            description: draft.description_html.as_deref(),
            variant_attributes: draft
                .options
                .iter()
                .map(|group| group.name.as_str())
                .collect(),
        };

        let response = self
            .client
            .post(format!("{API_BASE}/commerce/products"))
            .bearer_auth(access_token.expose_secret())
            .json(&request)
            .send()
            .await?;
        let response = check_status(response).await?;
        let product: SquarespaceProduct = response.json().await?;

        Ok(product.into())
    }

    #[instrument(skip_all)]
    async fn list_products(
        &self,
        access_token: &SecretString,
        _domain: &str,
    ) -> Result<Vec<ProductSnapshot>, PlatformError> {
        let response = self
            .client
            .get(format!("{API_BASE}/commerce/products"))
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;
        let response = check_status(response).await?;
        let page: ProductsPage = response.json().await?;

        Ok(page.products.into_iter().map(Into::into).collect())
    }

    #[instrument(skip_all)]
    async fn list_orders(
        &self,
        access_token: &SecretString,
        _domain: &str,
    ) -> Result<Vec<OrderSnapshot>, PlatformError> {
        let response = self
            .client
            .get(format!("{API_BASE}/commerce/orders"))
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;
        let response = check_status(response).await?;
        let page: OrdersPage = response.json().await?;

        Ok(page.result.into_iter().map(Into::into).collect())
    }

    fn parse_product_webhook(&self, body: &[u8]) -> Result<ProductSnapshot, PlatformError> {
        let notification: Notification<SquarespaceProduct> = serde_json::from_slice(body)
            .map_err(|e| PlatformError::MalformedPayload(e.to_string()))?;
        Ok(notification.data.into())
    }

    fn parse_order_webhook(&self, body: &[u8]) -> Result<OrderSnapshot, PlatformError> {
        let notification: Notification<SquarespaceOrder> = serde_json::from_slice(body)
            .map_err(|e| PlatformError::MalformedPayload(e.to_string()))?;
        Ok(notification.data.into())
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

// No Debug derive: carries live token material.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token_expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Website {
    title: String,
    primary_domain: String,
}

/// Webhook notification envelope; `data` carries the resource.
#[derive(Debug, Deserialize)]
struct Notification<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ProductsPage {
    #[serde(default)]
    products: Vec<SquarespaceProduct>,
}

#[derive(Debug, Deserialize)]
struct OrdersPage {
    #[serde(default)]
    result: Vec<SquarespaceOrder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquarespaceProduct {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    variant_attributes: Vec<String>,
    #[serde(default)]
    variants: Vec<SquarespaceVariant>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquarespaceVariant {
    id: String,
    #[serde(default)]
    sku: Option<String>,
    #[serde(default)]
    attributes: HashMap<String, String>,
    #[serde(default)]
    pricing: Option<Pricing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pricing {
    base_price: SquarespaceMoney,
}

#[derive(Debug, Deserialize)]
struct SquarespaceMoney {
    value: Decimal,
    #[serde(default)]
    currency: Option<String>,
}

impl From<SquarespaceProduct> for ProductSnapshot {
    fn from(product: SquarespaceProduct) -> Self {
        // Squarespace reports option names on the product and values per
        // variant; rebuild ordered option groups from the variants' attribute
        // maps, first-seen value order.
        let mut options: Vec<OptionGroup> = product
            .variant_attributes
            .iter()
            .map(|name| OptionGroup {
                name: name.clone(),
                values: Vec::new(),
            })
            .collect();
        for variant in &product.variants {
            for group in &mut options {
                if let Some(value) = variant.attributes.get(&group.name)
                    && !group.values.contains(value)
                {
                    group.values.push(value.clone());
                }
            }
        }

        let variants = product
            .variants
            .into_iter()
            .enumerate()
            .map(|(index, variant)| {
                let title = product
                    .variant_attributes
                    .iter()
                    .filter_map(|name| variant.attributes.get(name).cloned())
                    .collect::<Vec<_>>()
                    .join(" / ");
                VariantSnapshot {
                    title: if title.is_empty() {
                        variant.sku.clone().unwrap_or_else(|| variant.id.clone())
                    } else {
                        title
                    },
                    external_id: variant.id,
                    sku: variant.sku,
                    price: variant.pricing.map(|pricing| pricing.base_price.value),
                    position: i32::try_from(index + 1).unwrap_or(i32::MAX),
                }
            })
            .collect();

        Self {
            external_id: product.id,
            title: product.name,
            description_html: product.description,
            options,
            variants,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquarespaceOrder {
    id: String,
    #[serde(default)]
    order_number: Option<String>,
    #[serde(default)]
    line_items: Vec<SquarespaceLineItem>,
    subtotal: SquarespaceMoney,
    #[serde(default)]
    discount_total: Option<SquarespaceMoney>,
    #[serde(default)]
    tax_total: Option<SquarespaceMoney>,
    #[serde(default)]
    shipping_total: Option<SquarespaceMoney>,
    grand_total: SquarespaceMoney,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquarespaceLineItem {
    id: String,
    product_name: String,
    quantity: i32,
    unit_price_paid: SquarespaceMoney,
    #[serde(default)]
    variant_id: Option<String>,
}

impl From<SquarespaceOrder> for OrderSnapshot {
    fn from(order: SquarespaceOrder) -> Self {
        let money = |field: Option<SquarespaceMoney>| field.map_or(Decimal::ZERO, |m| m.value);
        let currency = order
            .grand_total
            .currency
            .clone()
            .unwrap_or_else(|| "USD".to_string());

        Self {
            external_id: order.id,
            number: order.order_number,
            currency,
            subtotal: order.subtotal.value,
            discount_total: money(order.discount_total),
            tax_total: money(order.tax_total),
            shipping_total: money(order.shipping_total),
            total: order.grand_total.value,
            items: order
                .line_items
                .into_iter()
                .map(|item| OrderItemSnapshot {
                    external_id: item.id,
                    title: item.product_name,
                    quantity: item.quantity,
                    unit_price: item.unit_price_paid.value,
                    line_total: item.unit_price_paid.value * Decimal::from(item.quantity),
                    external_variant_id: item.variant_id,
                })
                .collect(),
        }
    }
}

// Used by `create_product`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProductCreateRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    variant_attributes: Vec<&'a str>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn adapter() -> SquarespaceAdapter {
        let config = test_config();
        SquarespaceAdapter::new(reqwest::Client::new(), &config.squarespace)
    }

    #[test]
    fn test_authorize_url_does_not_require_domain() {
        let url = adapter()
            .authorize_url(None, "https://app.example.com/callback", "state123")
            .unwrap();
        assert!(url.starts_with(LOGIN_BASE));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("state=state123"));
    }

    #[test]
    fn test_parse_product_webhook_rebuilds_option_groups() {
        let body = br#"{
            "id": "notif-1",
            "topic": "product.update",
            "data": {
                "id": "prod-9",
                "name": "Framed Print",
                "description": "<p>Giclee</p>",
                "variantAttributes": ["Size", "Frame"],
                "variants": [
                    {"id": "var-1", "sku": "FP-8x10-B", "attributes": {"Size": "8x10", "Frame": "Black"}, "pricing": {"basePrice": {"value": "45.00", "currency": "USD"}}},
                    {"id": "var-2", "sku": "FP-5x7-B", "attributes": {"Size": "5x7", "Frame": "Black"}, "pricing": {"basePrice": {"value": "30.00", "currency": "USD"}}},
                    {"id": "var-3", "sku": "FP-8x10-W", "attributes": {"Size": "8x10", "Frame": "White"}, "pricing": {"basePrice": {"value": "45.00", "currency": "USD"}}}
                ]
            }
        }"#;

        let snapshot = adapter().parse_product_webhook(body).unwrap();
        assert_eq!(snapshot.external_id, "prod-9");
        assert_eq!(snapshot.options.len(), 2);
        assert_eq!(snapshot.options[0].name, "Size");
        assert_eq!(snapshot.options[0].values, vec!["8x10", "5x7"]);
        assert_eq!(snapshot.options[1].values, vec!["Black", "White"]);
        assert_eq!(snapshot.variants[0].title, "8x10 / Black");
        assert_eq!(snapshot.variants[2].position, 3);
    }

    #[test]
    fn test_parse_order_webhook() {
        let body = br#"{
            "id": "notif-2",
            "topic": "order.create",
            "data": {
                "id": "order-77",
                "orderNumber": "77",
                "lineItems": [
                    {"id": "li-1", "productName": "Framed Print", "quantity": 2, "unitPricePaid": {"value": "45.00", "currency": "USD"}, "variantId": "var-1"}
                ],
                "subtotal": {"value": "90.00", "currency": "USD"},
                "taxTotal": {"value": "7.20", "currency": "USD"},
                "shippingTotal": {"value": "10.00", "currency": "USD"},
                "grandTotal": {"value": "107.20", "currency": "USD"}
            }
        }"#;

        let snapshot = adapter().parse_order_webhook(body).unwrap();
        assert_eq!(snapshot.external_id, "order-77");
        assert_eq!(snapshot.currency, "USD");
        assert_eq!(snapshot.discount_total, Decimal::ZERO);
        assert_eq!(snapshot.items[0].line_total, "90.00".parse().unwrap());
        assert_eq!(snapshot.total, "107.20".parse().unwrap());
    }
}
