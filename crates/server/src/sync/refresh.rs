//! Token refresher: expiry-aware, single-flight per store.
//!
//! Sync and webhook code never reads credentials directly; everything goes
//! through [`TokenRefresher::valid_token`], which refreshes expiring tokens
//! transparently. Refresh is serialized per store so concurrent callers share
//! one in-flight refresh instead of racing the platform.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use saltbox_core::StoreId;
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::models::{Credential, Store};
use crate::platform::{PlatformAdapters, PlatformError};
use crate::storage::Storage;

use super::SyncError;

/// Refresh when the access token expires within this margin.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Hands out non-expired access tokens, refreshing when needed.
pub struct TokenRefresher {
    storage: Arc<dyn Storage>,
    adapters: PlatformAdapters,
    margin: chrono::Duration,
    locks: Mutex<HashMap<StoreId, Arc<Mutex<()>>>>,
}

impl TokenRefresher {
    /// Create a refresher with the production safety margin.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, adapters: PlatformAdapters) -> Self {
        Self {
            storage,
            adapters,
            margin: chrono::Duration::seconds(REFRESH_MARGIN_SECS),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn needs_refresh(&self, credential: &Credential) -> bool {
        credential
            .access_expires_at
            .is_some_and(|expires_at| expires_at - self.margin <= Utc::now())
    }

    async fn lock_for(&self, store_id: StoreId) -> Arc<Mutex<()>> {
        self.locks
            .lock()
            .await
            .entry(store_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Return a non-expired access token for the store.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ReauthorizationRequired` when no credential or
    /// refresh token exists, or when the platform rejects the refresh (a dead
    /// refresh token is reported upward, never retried).
    #[instrument(skip(self, store), fields(store_uid = %store.uid))]
    pub async fn valid_token(&self, store: &Store) -> Result<SecretString, SyncError> {
        let credential = self
            .storage
            .credential_for_store(store.id)
            .await?
            .ok_or(SyncError::ReauthorizationRequired)?;
        if !self.needs_refresh(&credential) {
            return Ok(credential.access_token);
        }

        let lock = self.lock_for(store.id).await;
        let _guard = lock.lock().await;

        // Re-check after acquiring: another waiter may have refreshed while
        // we queued, in which case we use its result.
        let credential = self
            .storage
            .credential_for_store(store.id)
            .await?
            .ok_or(SyncError::ReauthorizationRequired)?;
        if !self.needs_refresh(&credential) {
            return Ok(credential.access_token);
        }

        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or(SyncError::ReauthorizationRequired)?;

        let grant = self
            .adapters
            .get(store.platform)
            .refresh_token(&refresh_token)
            .await
            .map_err(|err| match err {
                PlatformError::Unavailable(message) => SyncError::PlatformUnavailable(message),
                _ => SyncError::ReauthorizationRequired,
            })?;

        let mut write = grant.into_credential_write();
        // Keep the old refresh material when the platform does not rotate it.
        if write.refresh_token.is_none() {
            write.refresh_token = credential.refresh_token;
            write.refresh_expires_at = credential.refresh_expires_at;
        }
        let access_token = write.access_token.clone();
        self.storage.upsert_credential(store.id, write).await?;

        tracing::info!(store_uid = %store.uid, "access token refreshed");
        Ok(access_token)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use saltbox_core::{OrganizationId, Platform};
    use secrecy::ExposeSecret;
    use uuid::Uuid;

    use crate::models::{CredentialWrite, NewStore};
    use crate::platform::testing::MockAdapter;
    use crate::storage::MemoryStorage;

    use super::*;

    fn expired_credential() -> CredentialWrite {
        CredentialWrite {
            access_token: SecretString::from("stale-access"),
            refresh_token: Some(SecretString::from("live-refresh")),
            access_expires_at: Some(Utc::now() - chrono::Duration::minutes(5)),
            refresh_expires_at: None,
        }
    }

    fn eternal_credential() -> CredentialWrite {
        CredentialWrite {
            access_token: SecretString::from("eternal-access"),
            refresh_token: None,
            access_expires_at: None,
            refresh_expires_at: None,
        }
    }

    async fn setup(
        adapter: Arc<MockAdapter>,
        credential: CredentialWrite,
    ) -> (TokenRefresher, Store) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let store = storage
            .connect_store(
                NewStore {
                    uid: Uuid::new_v4(),
                    platform: Platform::Squarespace,
                    domain: "site.example.com".to_string(),
                    display_name: "Site".to_string(),
                    organization_id: OrganizationId::new(1),
                    created_by: None,
                },
                credential,
            )
            .await
            .unwrap();
        let adapters = PlatformAdapters::new(
            Arc::new(MockAdapter::new(Platform::Shopify)),
            adapter,
        );
        (TokenRefresher::new(storage, adapters), store)
    }

    #[tokio::test]
    async fn test_fresh_token_is_returned_without_refresh() {
        let adapter = Arc::new(MockAdapter::new(Platform::Squarespace));
        let (refresher, store) = setup(adapter.clone(), eternal_credential()).await;

        let token = refresher.valid_token(&store).await.unwrap();
        assert_eq!(token.expose_secret(), "eternal-access");
        assert_eq!(adapter.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_triggers_refresh() {
        let adapter = Arc::new(MockAdapter::new(Platform::Squarespace));
        let (refresher, store) = setup(adapter.clone(), expired_credential()).await;

        let token = refresher.valid_token(&store).await.unwrap();
        assert_eq!(token.expose_secret(), "refreshed-access-1");
        assert_eq!(adapter.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let adapter = Arc::new(
            MockAdapter::new(Platform::Squarespace)
                .with_refresh_delay(Duration::from_millis(20)),
        );
        let (refresher, store) = setup(adapter.clone(), expired_credential()).await;

        let (a, b) = tokio::join!(refresher.valid_token(&store), refresher.valid_token(&store));
        let a = a.unwrap();
        let b = b.unwrap();

        // exactly one refresh call reached the platform; both waiters got it
        assert_eq!(adapter.refresh_calls(), 1);
        assert_eq!(a.expose_secret(), "refreshed-access-1");
        assert_eq!(b.expose_secret(), "refreshed-access-1");
    }

    #[tokio::test]
    async fn test_missing_refresh_token_requires_reauthorization() {
        let adapter = Arc::new(MockAdapter::new(Platform::Squarespace));
        let credential = CredentialWrite {
            refresh_token: None,
            ..expired_credential()
        };
        let (refresher, store) = setup(adapter.clone(), credential).await;

        let err = refresher.valid_token(&store).await.unwrap_err();
        assert!(matches!(err, SyncError::ReauthorizationRequired));
        assert_eq!(adapter.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_rejected_refresh_requires_reauthorization() {
        let adapter = Arc::new(MockAdapter::new(Platform::Squarespace).failing_refresh());
        let (refresher, store) = setup(adapter.clone(), expired_credential()).await;

        let err = refresher.valid_token(&store).await.unwrap_err();
        assert!(matches!(err, SyncError::ReauthorizationRequired));
        assert_eq!(adapter.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_credential_requires_reauthorization() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let adapters = PlatformAdapters::new(
            Arc::new(MockAdapter::new(Platform::Shopify)),
            Arc::new(MockAdapter::new(Platform::Squarespace)),
        );
        let refresher = TokenRefresher::new(storage.clone(), adapters);

        let store = storage
            .connect_store(
                NewStore {
                    uid: Uuid::new_v4(),
                    platform: Platform::Squarespace,
                    domain: "site.example.com".to_string(),
                    display_name: "Site".to_string(),
                    organization_id: OrganizationId::new(1),
                    created_by: None,
                },
                eternal_credential(),
            )
            .await
            .unwrap();
        storage.delete_store(store.id).await.unwrap();

        let err = refresher.valid_token(&store).await.unwrap_err();
        assert!(matches!(err, SyncError::ReauthorizationRequired));
    }
}
