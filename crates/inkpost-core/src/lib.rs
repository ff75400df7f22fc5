//! Core library for inkpost.
//!
//! Provides the data-access layer for an inkpost blog server:
//!
//! - `api`: REST client returning raw responses and transport errors
//! - `auth`: bearer token store with write-through persistence
//! - `loader`: single-post page loader that maps transport errors to page errors
//! - `models`: typed views of the server's JSON payloads
//! - `config`: on-disk configuration with environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod loader;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, ApiResponse};
pub use auth::{AuthState, AuthStore, TokenStorage};
pub use config::{Config, Locale, StorageBackend};
pub use loader::{PageError, PageMessages, PostLoader, PostPage};
