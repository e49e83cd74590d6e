//! The commerce platforms Saltbox can connect to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A supported commerce platform.
///
/// Every connected store belongs to exactly one platform, and the platform
/// selects the concrete adapter used for OAuth, webhooks, and sync calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Shopify,
    Squarespace,
}

impl Platform {
    /// All supported platforms, in a stable order.
    pub const ALL: [Self; 2] = [Self::Shopify, Self::Squarespace];

    /// Canonical lowercase name, as stored in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Shopify => "shopify",
            Self::Squarespace => "squarespace",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown platform name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown platform: {0}")]
pub struct PlatformParseError(pub String);

impl FromStr for Platform {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shopify" => Ok(Self::Shopify),
            "squarespace" => Ok(Self::Squarespace),
            other => Err(PlatformParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_round_trip() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
    }

    #[test]
    fn test_platform_parse_rejects_unknown() {
        let err = "bigcommerce".parse::<Platform>().unwrap_err();
        assert_eq!(err.to_string(), "unknown platform: bigcommerce");
    }

    #[test]
    fn test_platform_serde_lowercase() {
        let json = serde_json::to_string(&Platform::Squarespace).unwrap();
        assert_eq!(json, "\"squarespace\"");
    }
}
