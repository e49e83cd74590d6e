//! OAuth connector: authorization-code exchange and credential issuance.
//!
//! Drives the connect flow for both platforms: issue a CSRF state token,
//! redirect the merchant to the platform's authorize URL, then on callback
//! validate the state, exchange the code, fetch the site identity, and commit
//! the store together with its credential in one transaction.

use std::sync::Arc;

use saltbox_core::{OrganizationId, Platform};
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::models::{NewStore, Store};
use crate::platform::{PlatformAdapters, PlatformError};
use crate::storage::{Storage, StorageError};

pub mod state;

pub use state::{OAuthStateStore, StateEntry};

/// Errors surfaced from the OAuth flow.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// State token missing, expired, already consumed, or session mismatch.
    #[error("invalid or already-used OAuth state")]
    InvalidState,

    /// The platform reported an OAuth error. Message is verbatim.
    #[error("platform rejected authorization: {0}")]
    PlatformRejected(String),

    /// Transient platform failure; the merchant can simply retry the flow.
    #[error("platform unavailable: {0}")]
    PlatformUnavailable(String),

    /// Storage failed while committing the store and credential.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<PlatformError> for OAuthError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::Rejected(message) => Self::PlatformRejected(message),
            PlatformError::Unavailable(message) => Self::PlatformUnavailable(message),
            other => Self::PlatformRejected(other.to_string()),
        }
    }
}

/// Query parameters delivered to the OAuth callback.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Shop domain echoed back by Shopify.
    pub shop: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Drives the authorization-code flow for every platform.
pub struct OAuthConnector {
    storage: Arc<dyn Storage>,
    adapters: PlatformAdapters,
    states: OAuthStateStore,
    callback_url: String,
    default_organization: OrganizationId,
}

impl OAuthConnector {
    /// Create a connector.
    #[must_use]
    pub fn new(
        storage: Arc<dyn Storage>,
        adapters: PlatformAdapters,
        callback_url: String,
        default_organization: OrganizationId,
    ) -> Self {
        Self {
            storage,
            adapters,
            states: OAuthStateStore::new(),
            callback_url,
            default_organization,
        }
    }

    /// Begin the flow: issue a state token and build the authorize URL.
    ///
    /// `session_key` identifies the merchant's browser session; the callback
    /// must present the same key. No secret beyond the public client id is
    /// embedded in the returned URL.
    ///
    /// # Errors
    ///
    /// Returns `OAuthError::PlatformRejected` if required input is missing
    /// (e.g., no shop domain for a Shopify connect).
    pub async fn begin_authorization(
        &self,
        platform: Platform,
        session_key: &str,
        shop_domain: Option<&str>,
    ) -> Result<String, OAuthError> {
        let state = self
            .states
            .issue(platform, session_key, shop_domain.map(String::from))
            .await;

        let url = self.adapters.get(platform).authorize_url(
            shop_domain,
            &self.callback_url,
            &state,
        )?;

        tracing::info!(%platform, "issued OAuth state, redirecting to authorize URL");
        Ok(url)
    }

    /// Complete the flow on callback.
    ///
    /// Validates and consumes the state token, exchanges the code, fetches
    /// the minimal site identity, and upserts the store keyed by
    /// (platform, domain) together with its credential. The store and the
    /// credential commit in one transaction: a failure after the exchange
    /// leaves no half-connected store behind.
    ///
    /// # Errors
    ///
    /// - `OAuthError::InvalidState` if the state mismatches or was consumed.
    /// - `OAuthError::PlatformRejected` if the platform reported an error.
    /// - `OAuthError::PlatformUnavailable` on transient exchange failures.
    #[instrument(skip(self, params, session_key))]
    pub async fn complete_authorization(
        &self,
        params: CallbackParams,
        session_key: &str,
    ) -> Result<Store, OAuthError> {
        // Platform-reported errors surface verbatim before anything else.
        if let Some(error) = params.error {
            let description = params.error_description.unwrap_or_default();
            return Err(OAuthError::PlatformRejected(if description.is_empty() {
                error
            } else {
                format!("{error}: {description}")
            }));
        }

        let Some(state) = params.state.as_deref() else {
            return Err(OAuthError::InvalidState);
        };
        let entry = self
            .states
            .consume(state, session_key)
            .await
            .ok_or(OAuthError::InvalidState)?;

        let code = params
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::PlatformRejected("missing authorization code".into()))?;

        // Shopify echoes the shop back on the callback; fall back to the one
        // recorded when the state was issued.
        let shop_domain = params.shop.or(entry.shop_domain);

        let adapter = self.adapters.get(entry.platform);
        let grant = adapter
            .exchange_code(code, &self.callback_url, shop_domain.as_deref())
            .await?;
        let site = adapter
            .fetch_site_info(&grant.access_token, shop_domain.as_deref())
            .await?;

        let store = self
            .storage
            .connect_store(
                NewStore {
                    uid: Uuid::new_v4(),
                    platform: entry.platform,
                    domain: site.domain,
                    display_name: site.display_name,
                    organization_id: self.default_organization,
                    created_by: None,
                },
                grant.into_credential_write(),
            )
            .await?;

        tracing::info!(
            platform = %store.platform,
            domain = %store.domain,
            store_uid = %store.uid,
            "store connected"
        );
        Ok(store)
    }
}
