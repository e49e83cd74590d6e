//! Tenant lifecycle: activate, deactivate, disconnect.
//!
//! Transitions: `Connected(active) ⇄ Deactivated` (toggle), and
//! `Connected → Disconnected` (terminal). Disconnect removes the credential
//! and all mirrored records, so later webhooks for the domain resolve to no
//! tenant and are refused rather than queued. Deactivated stores still
//! accept webhooks for record-keeping; the sync engine refuses
//! admin-triggered product creation for them.

use std::sync::Arc;

use tracing::instrument;

use crate::models::Store;
use crate::storage::{Storage, StorageError};

/// Governs store connect/disconnect/activate/deactivate transitions.
pub struct TenantLifecycle {
    storage: Arc<dyn Storage>,
}

impl TenantLifecycle {
    /// Create a lifecycle manager over the given storage.
    #[must_use]
    pub const fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Re-enable a deactivated store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the store does not exist.
    #[instrument(skip(self, store), fields(store_uid = %store.uid))]
    pub async fn activate(&self, store: &Store) -> Result<(), StorageError> {
        self.storage.set_store_active(store.id, true).await?;
        tracing::info!(store_uid = %store.uid, "store activated");
        Ok(())
    }

    /// Soft-disable a store. Webhooks continue to mirror; admin-triggered
    /// product creation is refused.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the store does not exist.
    #[instrument(skip(self, store), fields(store_uid = %store.uid))]
    pub async fn deactivate(&self, store: &Store) -> Result<(), StorageError> {
        self.storage.set_store_active(store.id, false).await?;
        tracing::info!(store_uid = %store.uid, "store deactivated");
        Ok(())
    }

    /// Terminal transition: remove the store, its credential, and its
    /// mirrored records.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the store does not exist.
    #[instrument(skip(self, store), fields(store_uid = %store.uid))]
    pub async fn disconnect(&self, store: &Store) -> Result<(), StorageError> {
        self.storage.delete_store(store.id).await?;
        tracing::info!(
            store_uid = %store.uid,
            platform = %store.platform,
            domain = %store.domain,
            "store disconnected"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use saltbox_core::{OrganizationId, Platform};
    use secrecy::SecretString;
    use uuid::Uuid;

    use crate::models::{CredentialWrite, NewStore};
    use crate::storage::MemoryStorage;

    use super::*;

    async fn connected_store(storage: &Arc<dyn Storage>) -> Store {
        storage
            .connect_store(
                NewStore {
                    uid: Uuid::new_v4(),
                    platform: Platform::Shopify,
                    domain: "shop-a.myshopify.com".to_string(),
                    display_name: "Shop A".to_string(),
                    organization_id: OrganizationId::new(1),
                    created_by: None,
                },
                CredentialWrite {
                    access_token: SecretString::from("shpat_token"),
                    refresh_token: None,
                    access_expires_at: None,
                    refresh_expires_at: None,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_deactivate_and_reactivate() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let lifecycle = TenantLifecycle::new(storage.clone());
        let store = connected_store(&storage).await;

        lifecycle.deactivate(&store).await.unwrap();
        assert!(!storage.store_by_uid(store.uid).await.unwrap().unwrap().active);

        lifecycle.activate(&store).await.unwrap();
        assert!(storage.store_by_uid(store.uid).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_disconnect_is_terminal() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let lifecycle = TenantLifecycle::new(storage.clone());
        let store = connected_store(&storage).await;

        lifecycle.disconnect(&store).await.unwrap();

        // the tenant no longer resolves, and the credential is gone
        assert!(storage.store_by_uid(store.uid).await.unwrap().is_none());
        assert!(
            storage
                .store_by_domain(Platform::Shopify, "shop-a.myshopify.com")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            storage
                .credential_for_store(store.id)
                .await
                .unwrap()
                .is_none()
        );
    }
}
