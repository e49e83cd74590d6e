//! Saltbox server library.
//!
//! Connects merchant storefronts on third-party commerce platforms (Shopify,
//! Squarespace) to the internal order-fulfilment pipeline. This crate
//! provides the service as a library so the router and engine can be driven
//! directly in tests.
//!
//! # Architecture
//!
//! - [`platform`] - One capability adapter per platform (OAuth, REST, webhooks)
//! - [`oauth`] - Authorization-code flow with single-use CSRF state tokens
//! - [`webhooks`] - Signature verification over raw bytes, tenant resolution, dispatch
//! - [`sync`] - Idempotent reconciliation engine, token refresh, retry policy
//! - [`tenancy`] - Store activate/deactivate/disconnect transitions
//! - [`storage`] - `PostgreSQL` persistence behind a trait (in-memory for tests)

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod models;
pub mod oauth;
pub mod platform;
pub mod routes;
pub mod state;
pub mod storage;
pub mod sync;
pub mod tenancy;
pub mod webhooks;
