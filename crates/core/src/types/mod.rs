//! Core types for Saltbox.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod money;
pub mod platform;

pub use id::*;
pub use money::Money;
pub use platform::{Platform, PlatformParseError};
