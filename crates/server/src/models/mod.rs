//! Domain records mirrored from the connected platforms.
//!
//! Every mirrored record is owned by exactly one [`Store`] and keyed by the
//! platform-side external id. Secrets live in [`Credential`] and are only
//! written by the OAuth connector and the token refresher.

pub mod order;
pub mod product;
pub mod store;

pub use order::{Order, OrderItem};
pub use product::{OptionGroup, Product, ProductVariant};
pub use store::{Credential, CredentialWrite, NewStore, Store};
