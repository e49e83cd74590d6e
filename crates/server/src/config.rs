//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SALTBOX_DATABASE_URL` - `PostgreSQL` connection string
//! - `SALTBOX_BASE_URL` - Public URL for OAuth callbacks and webhook registration
//! - `SHOPIFY_CLIENT_ID` - Shopify app OAuth client ID
//! - `SHOPIFY_CLIENT_SECRET` - Shopify app OAuth client secret (also signs webhooks)
//! - `SQUARESPACE_CLIENT_ID` - Squarespace app OAuth client ID
//! - `SQUARESPACE_CLIENT_SECRET` - Squarespace app OAuth client secret (also signs webhooks)
//!
//! ## Optional
//! - `SALTBOX_HOST` - Bind address (default: 127.0.0.1)
//! - `SALTBOX_PORT` - Listen port (default: 3002)
//! - `SALTBOX_ORGANIZATION_ID` - Owning organization for self-service connects (default: 1)
//! - `SALTBOX_PLATFORM_TIMEOUT_SECS` - Outbound platform call timeout (default: 15)
//! - `SHOPIFY_API_VERSION` - Shopify REST API version (default: 2026-01)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` / `SENTRY_TRACES_SAMPLE_RATE` - Sentry sample rates

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use saltbox_core::OrganizationId;
use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL used to build OAuth redirect URIs
    pub base_url: String,
    /// Organization that owns stores connected via the self-service flow
    pub default_organization: OrganizationId,
    /// Timeout applied to every outbound platform call
    pub platform_timeout: Duration,
    /// Shopify app credentials
    pub shopify: PlatformAppConfig,
    /// Squarespace app credentials
    pub squarespace: PlatformAppConfig,
    /// Shopify REST API version (e.g., 2026-01)
    pub shopify_api_version: String,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// OAuth app credentials for one platform.
///
/// Implements `Debug` manually to redact the client secret. The client secret
/// doubles as the webhook signing secret on both supported platforms.
#[derive(Clone)]
pub struct PlatformAppConfig {
    /// OAuth client ID (public identifier)
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: SecretString,
}

impl std::fmt::Debug for PlatformAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformAppConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl PlatformAppConfig {
    fn from_env(id_var: &str, secret_var: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            client_id: get_required_env(id_var)?,
            client_secret: get_validated_secret(secret_var)?,
        })
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("SALTBOX_DATABASE_URL")?;
        let host = get_env_or_default("SALTBOX_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("SALTBOX_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("SALTBOX_PORT", "3002")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SALTBOX_PORT".to_string(), e.to_string()))?;
        let base_url = get_required_env("SALTBOX_BASE_URL")?;
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("SALTBOX_BASE_URL".to_string(), e.to_string())
        })?;
        let default_organization = get_env_or_default("SALTBOX_ORGANIZATION_ID", "1")
            .parse::<i64>()
            .map(OrganizationId::new)
            .map_err(|e| {
                ConfigError::InvalidEnvVar("SALTBOX_ORGANIZATION_ID".to_string(), e.to_string())
            })?;
        let platform_timeout = get_env_or_default("SALTBOX_PLATFORM_TIMEOUT_SECS", "15")
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidEnvVar(
                    "SALTBOX_PLATFORM_TIMEOUT_SECS".to_string(),
                    e.to_string(),
                )
            })?;

        let shopify = PlatformAppConfig::from_env("SHOPIFY_CLIENT_ID", "SHOPIFY_CLIENT_SECRET")?;
        let squarespace =
            PlatformAppConfig::from_env("SQUARESPACE_CLIENT_ID", "SQUARESPACE_CLIENT_SECRET")?;
        let shopify_api_version = get_env_or_default("SHOPIFY_API_VERSION", "2026-01");

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            default_organization,
            platform_timeout,
            shopify,
            squarespace,
            shopify_api_version,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// The OAuth callback URL registered with both platforms.
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!("{}/callback", self.base_url.trim_end_matches('/'))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

/// A config suitable for tests that never touch the network or database.
#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        database_url: SecretString::from("postgres://localhost/saltbox_test"),
        host: "127.0.0.1".parse().unwrap(),
        port: 3002,
        base_url: "http://localhost:3002".to_string(),
        default_organization: OrganizationId::new(1),
        platform_timeout: Duration::from_secs(15),
        shopify: PlatformAppConfig {
            client_id: "shopify_client_id".to_string(),
            client_secret: SecretString::from("hush-hush-shopify-0f9d8a7b6c5d4e3f"),
        },
        squarespace: PlatformAppConfig {
            client_id: "squarespace_client_id".to_string(),
            client_secret: SecretString::from("hush-hush-squarespace-1a2b3c4d5e6f"),
        },
        shopify_api_version: "2026-01".to_string(),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 1.0,
    }
}
