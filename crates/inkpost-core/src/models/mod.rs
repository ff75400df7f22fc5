//! Typed views of the JSON an inkpost server sends and accepts.
//!
//! - `Post`, `Author`: resources returned by the post and author endpoints
//! - `PostPayload`: body for creating and updating posts
//! - Auth payloads: `LoginRequest`, `LoginResponse`, `SignupRequest`
//! - Acknowledgements: `MessageResponse`, `UploadResponse`
//!
//! The API client never requires these; they are what callers decode
//! `ApiResponse` bodies into when they want more than untyped JSON.

pub mod auth;
pub mod post;

pub use auth::{LoginRequest, LoginResponse, MessageResponse, SignupRequest, UploadResponse};
pub use post::{Author, Post, PostPayload};
