//! REST API client module for inkpost blog servers.
//!
//! This module provides the `ApiClient` for reading posts and authors,
//! logging in, and (with a bearer token) creating, updating and deleting
//! posts.
//!
//! Responses come back unmodified as `ApiResponse`. Any non-2xx status or
//! transport failure surfaces as an `ApiError`, which keeps the response
//! around for the caller to inspect.

pub mod client;
pub mod error;
pub mod response;

pub use client::{ApiClient, DEFAULT_API_BASE_URL};
pub use error::ApiError;
pub use response::ApiResponse;
