//! Application state shared across handlers.
//!
//! The tenant context is never ambient: handlers resolve a [`crate::models::Store`]
//! for their unit of work and pass it explicitly down through the connector,
//! engine, and lifecycle calls.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::oauth::OAuthConnector;
use crate::platform::PlatformAdapters;
use crate::storage::Storage;
use crate::sync::{RetryPolicy, SyncEngine};
use crate::tenancy::TenantLifecycle;

/// Application state shared across all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    storage: Arc<dyn Storage>,
    adapters: PlatformAdapters,
    oauth: OAuthConnector,
    engine: SyncEngine,
    tenancy: TenantLifecycle,
    retry: RetryPolicy,
}

impl AppState {
    /// Assemble the state from its injected parts.
    #[must_use]
    pub fn new(config: AppConfig, storage: Arc<dyn Storage>, adapters: PlatformAdapters) -> Self {
        let oauth = OAuthConnector::new(
            storage.clone(),
            adapters.clone(),
            config.callback_url(),
            config.default_organization,
        );
        let engine = SyncEngine::new(storage.clone(), adapters.clone());
        let tenancy = TenantLifecycle::new(storage.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                storage,
                adapters,
                oauth,
                engine,
                tenancy,
                retry: RetryPolicy::default(),
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.inner.storage
    }

    pub fn adapters(&self) -> &PlatformAdapters {
        &self.inner.adapters
    }

    pub fn oauth(&self) -> &OAuthConnector {
        &self.inner.oauth
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.inner.engine
    }

    pub fn tenancy(&self) -> &TenantLifecycle {
        &self.inner.tenancy
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }
}
