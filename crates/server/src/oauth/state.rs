//! Single-use OAuth state tokens for CSRF protection.
//!
//! A state token is a random 256-bit value bound to one browser session. It
//! is created at authorize-redirect time, consumed exactly once on callback,
//! and expires after a short TTL even if never used.

use std::time::Duration;

use moka::future::Cache;
use rand::RngCore;
use saltbox_core::Platform;

/// Unused state tokens expire after ten minutes.
const STATE_TTL: Duration = Duration::from_secs(600);

/// What a state token was issued for.
#[derive(Debug, Clone)]
pub struct StateEntry {
    pub platform: Platform,
    /// Random key stored in the issuing browser session.
    pub session_key: String,
    /// Shop domain entered by the merchant (Shopify connects only).
    pub shop_domain: Option<String>,
}

/// TTL cache of outstanding state tokens, keyed by the token value.
pub struct OAuthStateStore {
    cache: Cache<String, StateEntry>,
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthStateStore {
    /// Create a store with the production TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(STATE_TTL)
    }

    /// Create a store with an explicit TTL (tests use a short one).
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Issue a fresh state token bound to the given session.
    pub async fn issue(
        &self,
        platform: Platform,
        session_key: &str,
        shop_domain: Option<String>,
    ) -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let state = hex::encode(bytes);

        self.cache
            .insert(
                state.clone(),
                StateEntry {
                    platform,
                    session_key: session_key.to_string(),
                    shop_domain,
                },
            )
            .await;

        state
    }

    /// Consume a state token.
    ///
    /// Returns `None` if the token is unknown, expired, already consumed, or
    /// bound to a different session. The token is invalidated either way, so
    /// a replay after a mismatch also fails.
    pub async fn consume(&self, state: &str, session_key: &str) -> Option<StateEntry> {
        let entry = self.cache.remove(state).await?;
        (entry.session_key == session_key).then_some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_consume_round_trip() {
        let store = OAuthStateStore::new();
        let state = store
            .issue(Platform::Shopify, "session-1", Some("a.myshopify.com".into()))
            .await;
        // 256 bits, hex encoded
        assert_eq!(state.len(), 64);

        let entry = store.consume(&state, "session-1").await.expect("entry");
        assert_eq!(entry.platform, Platform::Shopify);
        assert_eq!(entry.shop_domain.as_deref(), Some("a.myshopify.com"));
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let store = OAuthStateStore::new();
        let state = store.issue(Platform::Squarespace, "session-1", None).await;

        assert!(store.consume(&state, "session-1").await.is_some());
        assert!(store.consume(&state, "session-1").await.is_none());
    }

    #[tokio::test]
    async fn test_consume_rejects_wrong_session() {
        let store = OAuthStateStore::new();
        let state = store.issue(Platform::Squarespace, "session-1", None).await;

        assert!(store.consume(&state, "session-2").await.is_none());
        // and the mismatch burned the token
        assert!(store.consume(&state, "session-1").await.is_none());
    }

    #[tokio::test]
    async fn test_consume_rejects_expired() {
        let store = OAuthStateStore::with_ttl(Duration::from_millis(20));
        let state = store.issue(Platform::Shopify, "session-1", None).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.consume(&state, "session-1").await.is_none());
    }

    #[tokio::test]
    async fn test_consume_rejects_unknown() {
        let store = OAuthStateStore::new();
        assert!(store.consume("never-issued", "session-1").await.is_none());
    }

    #[tokio::test]
    async fn test_issued_states_are_unique() {
        let store = OAuthStateStore::new();
        let a = store.issue(Platform::Shopify, "session-1", None).await;
        let b = store.issue(Platform::Shopify, "session-1", None).await;
        assert_ne!(a, b);
    }
}
