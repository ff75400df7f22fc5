//! Authentication module for holding the login token.
//!
//! This module provides:
//! - `AuthStore`: the current bearer token plus a derived "is authenticated"
//!   flag, observable through callbacks or a `tokio::sync::watch` channel
//! - `TokenStorage`: persistence backends the store writes through to
//!   (`FileStorage`, `KeyringStorage`, `MemoryStorage`)
//! - `TokenClaims`: read-only view of the JWT payload for display
//!
//! The token never expires on its own; it stays until it is replaced or the
//! user logs out.

pub mod claims;
pub mod storage;
pub mod store;

pub use claims::{ClaimsError, TokenClaims};
pub use storage::{
    open_storage, FileStorage, KeyringStorage, MemoryStorage, TokenStorage, TOKEN_STORAGE_KEY,
};
pub use store::{AuthState, AuthStore, SubscriptionId};
