//! API client for communicating with an inkpost blog server.
//!
//! This module provides the `ApiClient` struct. Every method issues exactly
//! one request and hands back the server's response untouched; mutating
//! calls take the bearer token as an argument instead of holding it.

use std::fmt::Display;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, Method, RequestBuilder};
use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::models::{LoginRequest, SignupRequest};

use super::{ApiError, ApiResponse};

// ============================================================================
// Constants
// ============================================================================

/// Base URL used when nothing is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api/v1";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Multipart field name the upload endpoint reads.
const UPLOAD_FIELD: &str = "file";

/// API client for an inkpost server.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the default local server
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_API_BASE_URL, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Create a client for `base_url`, e.g. `http://host:8080/api/v1`
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        Self::with_base_url(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Execute a request, returning the response on 2xx and an error
    /// carrying the response otherwise.
    async fn send(&self, request: RequestBuilder) -> Result<ApiResponse, ApiError> {
        let request = request.build()?;
        let method = request.method().clone();
        let url = request.url().clone();

        let response = self.client.execute(request).await?;
        let response = ApiResponse::read(response).await?;
        debug!(%method, %url, status = response.status.as_u16(), "API request completed");

        Self::check_response(response)
    }

    /// Check if response is successful, returning an error with the response if not.
    fn check_response(response: ApiResponse) -> Result<ApiResponse, ApiError> {
        if response.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_response(response))
        }
    }

    // ===== Posts (public) =====

    /// Fetch one page of posts. `page` and `limit` go to the server as-is.
    pub async fn get_posts(&self, page: i64, limit: i64) -> Result<ApiResponse, ApiError> {
        let path = format!("/posts/?page={}&limit={}", page, limit);
        self.send(self.request(Method::GET, &path)).await
    }

    /// Fetch a single post by identifier
    pub async fn get_post(&self, id: impl Display) -> Result<ApiResponse, ApiError> {
        let path = format!("/posts/{}", id);
        self.send(self.request(Method::GET, &path)).await
    }

    // ===== Authentication =====

    /// Log in; on success the body carries `{"token": "..."}`.
    pub async fn login(&self, username: &str, password: &str) -> Result<ApiResponse, ApiError> {
        let body = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        self.send(self.request(Method::POST, "/auth/login").json(&body))
            .await
    }

    /// Register a new account
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<ApiResponse, ApiError> {
        let body = SignupRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.send(self.request(Method::POST, "/auth/signup").json(&body))
            .await
    }

    // ===== Posts (bearer token required) =====

    pub async fn create_post<B>(&self, post_data: &B, token: &str) -> Result<ApiResponse, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let request = self
            .request(Method::POST, "/posts")
            .bearer_auth(token)
            .json(post_data);
        self.send(request).await
    }

    pub async fn update_post<B>(
        &self,
        id: impl Display,
        post_data: &B,
        token: &str,
    ) -> Result<ApiResponse, ApiError>
    where
        B: Serialize + ?Sized,
    {
        let path = format!("/posts/{}", id);
        let request = self
            .request(Method::PUT, &path)
            .bearer_auth(token)
            .json(post_data);
        self.send(request).await
    }

    pub async fn delete_post(&self, id: impl Display, token: &str) -> Result<ApiResponse, ApiError> {
        let path = format!("/posts/{}", id);
        self.send(self.request(Method::DELETE, &path).bearer_auth(token))
            .await
    }

    // ===== Authors and uploads =====

    /// Fetch an author's public profile
    pub async fn get_author(&self, id: impl Display) -> Result<ApiResponse, ApiError> {
        let path = format!("/author/{}", id);
        self.send(self.request(Method::GET, &path)).await
    }

    /// Upload an image (e.g. a post cover). The server sniffs the content
    /// type and answers with the public URL of the stored file.
    pub async fn upload_image(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        token: &str,
    ) -> Result<ApiResponse, ApiError> {
        let part = Part::bytes(bytes).file_name(filename.to_string());
        let form = Form::new().part(UPLOAD_FIELD, part);
        let request = self
            .request(Method::POST, "/upload/")
            .bearer_auth(token)
            .multipart(form);
        self.send(request).await
    }
}
