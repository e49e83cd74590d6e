//! Store (tenant) and credential records.

use chrono::{DateTime, Utc};
use saltbox_core::{CredentialId, OrganizationId, Platform, StoreId, UserId};
use secrecy::SecretString;
use serde::Serialize;
use uuid::Uuid;

/// One merchant's connection to one commerce platform.
///
/// A store is the unit of multi-tenancy: webhooks resolve to a store, sync
/// operations run against a store, and credentials belong to a store. At most
/// one store exists per (platform, domain) pair.
#[derive(Debug, Clone, Serialize)]
pub struct Store {
    pub id: StoreId,
    /// Stable external identifier, safe to expose in URLs.
    pub uid: Uuid,
    pub platform: Platform,
    /// Shop domain (Shopify) or site domain (Squarespace).
    pub domain: String,
    pub display_name: String,
    /// Deactivated stores still accept webhooks but refuse admin-triggered
    /// product creation.
    pub active: bool,
    /// Owning organization (ownership, not control).
    pub organization_id: OrganizationId,
    /// User who connected the store, when known.
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating or re-connecting a store.
///
/// The (platform, domain) pair is the upsert key; `uid` is only used when the
/// store does not exist yet.
#[derive(Debug, Clone)]
pub struct NewStore {
    pub uid: Uuid,
    pub platform: Platform,
    pub domain: String,
    pub display_name: String,
    pub organization_id: OrganizationId,
    pub created_by: Option<UserId>,
}

/// OAuth token material for one store.
///
/// Implements `Debug` manually to redact both tokens.
#[derive(Clone)]
pub struct Credential {
    pub id: CredentialId,
    pub store_id: StoreId,
    /// OAuth access token (HIGH PRIVILEGE - redacted in debug output).
    pub access_token: SecretString,
    /// OAuth refresh token, if the platform issues one.
    pub refresh_token: Option<SecretString>,
    /// When the access token expires; `None` means it does not expire.
    pub access_expires_at: Option<DateTime<Utc>>,
    /// When the refresh token expires, if known.
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("store_id", &self.store_id)
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish_non_exhaustive()
    }
}

/// Credential fields as written by the OAuth connector or token refresher.
#[derive(Clone)]
pub struct CredentialWrite {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub access_expires_at: Option<DateTime<Utc>>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for CredentialWrite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialWrite")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}
